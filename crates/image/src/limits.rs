//! Size advisories for large inputs and batches.
//!
//! Advisories are warnings for the caller to show. They never stop a
//! conversion.

use crate::metadata::extract_metadata;
use crate::{ConvertError, RawInput};
use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Thresholds for advisories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Files above this size get a `file_too_large` advisory
    pub file_size_warning_bytes: u64,
    /// Batches above this many files get a batch advisory
    pub batch_warning_threshold: usize,
    /// Decoded RGBA size above which `memory_exceeded` is raised
    pub memory_budget_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            file_size_warning_bytes: 25 * MIB,
            batch_warning_threshold: 30,
            memory_budget_bytes: 512 * MIB,
        }
    }
}

impl Limits {
    /// Advisories for a single input, in severity order.
    pub fn file_advisory(&self, input: &RawInput) -> Vec<ConvertError> {
        let mut advisories = Vec::new();

        let size = input.len() as u64;
        if size > self.file_size_warning_bytes {
            advisories.push(ConvertError::FileTooLarge {
                file: input.name().to_string(),
                size,
                limit: self.file_size_warning_bytes,
            });
        }

        if let Some(meta) = extract_metadata(input.bytes()) {
            let required = meta.decoded_bytes();
            if required > self.memory_budget_bytes {
                advisories.insert(
                    0,
                    ConvertError::MemoryExceeded {
                        file: input.name().to_string(),
                        required,
                        budget: self.memory_budget_bytes,
                    },
                );
            }
        }

        advisories
    }

    /// Message for a batch above the warning threshold.
    pub fn batch_advisory(&self, count: usize) -> Option<String> {
        (count > self.batch_warning_threshold).then(|| {
            format!(
                "Converting {} files at once may take a while. Files are processed one at a time.",
                count
            )
        })
    }
}

/// Format a byte count the way results are reported ("512B", "487KB",
/// "1.2MB").
///
/// ```
/// use covert_image::format_file_size;
///
/// assert_eq!(format_file_size(487 * 1024), "487KB");
/// assert_eq!(format_file_size(1_258_291), "1.2MB");
/// ```
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < MIB {
        format!("{}KB", (bytes as f64 / 1024.0).round() as u64)
    } else {
        format!("{:.1}MB", bytes as f64 / MIB as f64)
    }
}
