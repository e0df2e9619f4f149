use crate::ir::{SwizzleMask, WriteMask};

/// Parses `xyzw`/`rgba` component letters selecting from a
/// `src_component_count`-wide value.
pub fn swizzle_mask(x: &str, src_component_count: u8) -> Option<SwizzleMask> {
    if x.is_empty() || x.len() > 4 {
        return None;
    }
    let mut components = [0u8; 4];
    for (c, b) in components.iter_mut().zip(x.bytes()) {
        *c = swizzle_index(b, src_component_count)?;
    }
    Some(SwizzleMask::new(&components[..x.len()]))
}

/// Parses write-mask letters; each component may appear once.
pub fn write_mask(x: &str, dst_component_count: u8) -> Option<WriteMask> {
    let mut mask = WriteMask::empty();
    for b in x.bytes() {
        let bit = WriteMask::from_channel(swizzle_index(b, dst_component_count)? as usize);
        if mask.contains(bit) {
            return None;
        }
        mask |= bit;
    }
    Some(mask)
}

pub const fn swizzle_index(x: u8, src_component_count: u8) -> Option<u8> {
    match x {
        b'r' | b'R' | b'x' | b'X' if src_component_count >= 1 => Some(0),
        b'g' | b'G' | b'y' | b'Y' if src_component_count >= 2 => Some(1),
        b'b' | b'B' | b'z' | b'Z' if src_component_count >= 3 => Some(2),
        b'a' | b'A' | b'w' | b'W' if src_component_count >= 4 => Some(3),
        _ => None,
    }
}
