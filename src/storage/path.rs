//! Slab addressing: where the slab holding a tile lives in storage.

use super::ContextKind;

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Position of a tile inside the slab grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabAddress {
    /// Slab column
    pub x: u32,
    /// Slab row
    pub y: u32,
    /// Row-major tile index within the slab
    pub index: u32,
}

/// Locate tile `(col, row)` in a slab grid of `tiles_per_width x
/// tiles_per_height` tiles per slab.
///
/// Returns `None` for negative indices, which never exist in storage.
pub fn slab_address(col: i64, row: i64, tiles_per_width: u32, tiles_per_height: u32) -> Option<SlabAddress> {
    if col < 0 || row < 0 {
        return None;
    }
    let tpw = i64::from(tiles_per_width);
    let tph = i64::from(tiles_per_height);

    Some(SlabAddress {
        x: u32::try_from(col / tpw).ok()?,
        y: u32::try_from(row / tph).ok()?,
        index: u32::try_from((row % tph) * tpw + (col % tpw)).ok()?,
    })
}

/// File path of slab `(x, y)` below `root`.
///
/// Both indices are written in base 36 and interleaved digit by digit, the
/// `depth` least significant digit pairs each forming one path component:
/// `(x=1, y=2, depth=2)` is stored at `root/00/00/12.tif`.
pub fn slab_file_path(root: &str, x: u32, y: u32, depth: u32) -> String {
    let mut x = x;
    let mut y = y;
    // Built right to left
    let mut reversed: Vec<u8> = b"fit.".to_vec();

    for _ in 0..depth {
        reversed.push(BASE36[(y % 36) as usize]);
        reversed.push(BASE36[(x % 36) as usize]);
        reversed.push(b'/');
        x /= 36;
        y /= 36;
    }

    loop {
        reversed.push(BASE36[(y % 36) as usize]);
        reversed.push(BASE36[(x % 36) as usize]);
        x /= 36;
        y /= 36;
        if x == 0 && y == 0 {
            break;
        }
    }
    reversed.push(b'/');
    reversed.reverse();

    // Only ASCII was pushed
    let suffix = String::from_utf8_lossy(&reversed);
    format!("{}{}", root.trim_end_matches('/'), suffix)
}

/// Object name of slab `(x, y)` with `prefix`.
pub fn slab_object_key(prefix: &str, x: u32, y: u32) -> String {
    format!("{}_{}_{}", prefix, x, y)
}

/// Storage key of slab `(x, y)` for a context kind.
pub fn slab_key(kind: ContextKind, root: &str, x: u32, y: u32, depth: u32) -> String {
    match kind {
        ContextKind::File => slab_file_path(root, x, y, depth),
        ContextKind::S3 => slab_object_key(root, x, y),
    }
}
