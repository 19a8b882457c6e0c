//! Human-readable names for per-chunk flag bits.

/// Known load flag bits, by index. Names follow the community mapping for
/// the Respawn VPK format; unnamed bits are still valid.
const LOAD_FLAG_NAMES: [&str; 32] = {
    let mut names = [""; 32];
    names[0] = "VISIBLE";
    names[8] = "CACHE";
    names[10] = "ACACHE_UNK0";
    names[18] = "TEXTURE_UNK0";
    names[19] = "TEXTURE_UNK1";
    names[20] = "TEXTURE_UNK2";
    names
};

/// Known texture flag bits, by index.
const TEXTURE_FLAG_NAMES: [&str; 16] = {
    let mut names = [""; 16];
    names[3] = "DEFAULT";
    names[10] = "ENVIRONMENT_MAP";
    names
};

/// Describe each set load flag bit as `NN` or `NN:NAME`.
pub fn describe_load_flags(flags: u32) -> Vec<String> {
    (0..32)
        .filter(|i| flags & (1u32 << i) != 0)
        .map(|i| match LOAD_FLAG_NAMES[i] {
            "" => format!("{i:02}"),
            name => format!("{i:02}:{name}"),
        })
        .collect()
}

/// Describe each set texture flag bit as `NN` or `NN:NAME`.
pub fn describe_texture_flags(flags: u16) -> Vec<String> {
    (0..16)
        .filter(|i| flags & (1u16 << i) != 0)
        .map(|i| match TEXTURE_FLAG_NAMES[i] {
            "" => format!("{i:02}"),
            name => format!("{i:02}:{name}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_named_and_unnamed_bits() {
        assert_eq!(describe_load_flags(0x101), ["00:VISIBLE", "08:CACHE"]);
        assert_eq!(describe_load_flags(1 << 5), ["05"]);
        assert!(describe_load_flags(0).is_empty());
        assert_eq!(describe_texture_flags(1 << 3), ["03:DEFAULT"]);
    }
}
