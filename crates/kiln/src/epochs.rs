//! Epoch count estimation for training runs.
//!
//! Small datasets get more passes so the model sees enough tokens to
//! converge; the count steps down as the dataset grows.

/// Tiers of (max inclusive entry count, epochs). Checked in order.
const EPOCH_TIERS: &[(u64, u32)] = &[(100, 10), (500, 6), (1_000, 4), (5_000, 2)];

/// Epochs for datasets larger than the last tier.
const MIN_NUM_EPOCHS: u32 = 1;

/// Map a training-set size to the number of epochs the run is billed for.
///
/// Deterministic and monotonic non-increasing in the entry count.
pub fn calculate_num_epochs(num_training_entries: u64) -> u32 {
    for &(max_entries, epochs) in EPOCH_TIERS {
        if num_training_entries <= max_entries {
            return epochs;
        }
    }
    MIN_NUM_EPOCHS
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0 => 10)]
    #[test_case(1 => 10)]
    #[test_case(100 => 10)]
    #[test_case(101 => 6)]
    #[test_case(500 => 6)]
    #[test_case(501 => 4)]
    #[test_case(1_000 => 4)]
    #[test_case(1_001 => 2)]
    #[test_case(5_000 => 2)]
    #[test_case(5_001 => 1)]
    #[test_case(1_000_000 => 1)]
    fn test_epoch_tiers(num_entries: u64) -> u32 {
        calculate_num_epochs(num_entries)
    }

    #[test]
    fn test_epochs_never_increase_with_dataset_size() {
        let mut previous = calculate_num_epochs(0);
        for num_entries in 1..=10_000 {
            let epochs = calculate_num_epochs(num_entries);
            assert!(
                epochs <= previous,
                "epochs went up from {previous} to {epochs} at {num_entries} entries"
            );
            previous = epochs;
        }
    }

    #[test]
    fn test_epochs_deterministic() {
        for num_entries in [0, 73, 500, 4_999, 1_000_000] {
            assert_eq!(
                calculate_num_epochs(num_entries),
                calculate_num_epochs(num_entries)
            );
        }
    }
}
