//! Human-readable formatting for status and listing output.

/// Formats a byte count with binary units (B, KB, MB, GB, TB).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1024), "1.00 KB");
        assert_eq!(human_bytes(1536), "1.50 KB");
        assert_eq!(human_bytes(1_048_576), "1.00 MB");
        assert_eq!(human_bytes(1_073_741_824), "1.00 GB");
        assert_eq!(human_bytes(1_099_511_627_776), "1.00 TB");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn human_bytes_never_panics(bytes in 0u64..u64::MAX) {
                let _ = human_bytes(bytes);
            }

            #[test]
            fn human_bytes_always_names_a_unit(bytes in 0u64..u64::MAX) {
                let text = human_bytes(bytes);
                prop_assert!(text.ends_with('B'));
            }
        }
    }
}
