//! Architecture string normalization (spec.md §6).
//!
//! Collaborators (node registration, capacity eligibility) compare architecture
//! strings for strict equality only after normalizing to one of the canonical
//! forms below; there is no cross-architecture emulation.

/// Normalize a raw architecture string reported by a node agent into its
/// canonical form. Unrecognized strings pass through lower-cased.
pub fn normalize(raw: &str) -> String {
    match raw.to_ascii_lowercase().as_str() {
        "x86_64" | "amd64" | "x64" => "x86_64".to_string(),
        "aarch64" | "arm64" => "aarch64".to_string(),
        "i686" | "i386" | "x86" => "i686".to_string(),
        "armv7l" | "armv7" | "arm" => "armv7l".to_string(),
        other => other.to_string(),
    }
}

/// Strict equality after normalization — the only compatibility check the
/// scheduler performs between a workload's required architecture and a node's.
pub fn compatible(workload_arch: &str, node_arch: &str) -> bool {
    normalize(workload_arch) == normalize(node_arch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_x86_64_aliases() {
        for raw in ["x86_64", "amd64", "x64", "X86_64", "AMD64"] {
            assert_eq!(normalize(raw), "x86_64");
        }
    }

    #[test]
    fn normalizes_aarch64_aliases() {
        for raw in ["aarch64", "arm64", "ARM64"] {
            assert_eq!(normalize(raw), "aarch64");
        }
    }

    #[test]
    fn normalizes_i686_aliases() {
        for raw in ["i686", "i386", "x86"] {
            assert_eq!(normalize(raw), "i686");
        }
    }

    #[test]
    fn normalizes_armv7l_aliases() {
        for raw in ["armv7l", "armv7", "arm"] {
            assert_eq!(normalize(raw), "armv7l");
        }
    }

    #[test]
    fn unknown_architecture_passes_through_lowercased() {
        assert_eq!(normalize("RISCV64"), "riscv64");
    }

    #[test]
    fn compatibility_is_strict_after_normalization() {
        assert!(compatible("amd64", "x86_64"));
        assert!(!compatible("amd64", "aarch64"));
        assert!(!compatible("x86", "x86_64"));
    }
}
