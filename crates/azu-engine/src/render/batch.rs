//! CPU side of the quad batch buffer.
//!
//! The GPU buffer is persistently mapped; every frame the whole mapped range is
//! zero-filled and the active records are copied to the front, so trailing
//! records from a larger earlier frame can never be read.

use anyhow::{ensure, Result};

use super::quad::QuadRecord;

/// Size in bytes of a batch buffer holding `capacity` records.
#[inline]
pub const fn batch_bytes(capacity: usize) -> usize {
    capacity * std::mem::size_of::<QuadRecord>()
}

/// Zero-fills `dst`, then copies `quads` to its start.
///
/// Fails without touching `dst` when the records do not fit.
pub fn write_batch(dst: &mut [u8], quads: &[QuadRecord]) -> Result<()> {
    let src: &[u8] = bytemuck::cast_slice(quads);
    ensure!(
        src.len() <= dst.len(),
        "quad batch overflow: {} records need {} bytes, buffer holds {}",
        quads.len(),
        src.len(),
        dst.len()
    );

    dst.fill(0);
    dst[..src.len()].copy_from_slice(src);
    Ok(())
}

/// Reads back record `index` from a mapped batch. Test helper.
#[cfg(test)]
pub(crate) fn read_record(src: &[u8], index: usize) -> QuadRecord {
    let stride = std::mem::size_of::<QuadRecord>();
    bytemuck::pod_read_unaligned(&src[index * stride..(index + 1) * stride])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{Color, Rect};
    use crate::render::quad::QuadOptions;

    fn quad(i: usize) -> QuadRecord {
        QuadRecord::color(Rect::new(i as f32, 0.0, 10.0, 10.0), Color::red(), QuadOptions::default())
    }

    #[test]
    fn shrinking_frame_leaves_no_stale_records() {
        let mut buf = vec![0u8; batch_bytes(8)];

        let big: Vec<_> = (0..5).map(quad).collect();
        write_batch(&mut buf, &big).unwrap();
        assert_eq!(read_record(&buf, 4), quad(4));

        let small: Vec<_> = (0..3).map(quad).collect();
        write_batch(&mut buf, &small).unwrap();

        assert_eq!(read_record(&buf, 2), quad(2));
        assert!(buf[batch_bytes(3)..].iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_frame_clears_everything() {
        let mut buf = vec![0xAAu8; batch_bytes(4)];
        write_batch(&mut buf, &[]).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn overflow_is_rejected_and_buffer_untouched() {
        let mut buf = vec![0xAAu8; batch_bytes(2)];
        let quads: Vec<_> = (0..3).map(quad).collect();
        assert!(write_batch(&mut buf, &quads).is_err());
        assert!(buf.iter().all(|&b| b == 0xAA));
    }
}
