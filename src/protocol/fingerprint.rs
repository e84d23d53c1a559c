use std::fmt;

use sha2::{Digest, Sha256};

use crate::protocol::command::Command;

/// Content-derived identity of one extracted batch.
///
/// Two batches share a fingerprint exactly when they hold the same commands in the
/// same order. Only used to suppress re-application within one streamed message.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchFingerprint([u8; 32]);

impl BatchFingerprint {
    #[must_use]
    pub fn of(batch: &[Command]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((batch.len() as u64).to_le_bytes());

        for command in batch {
            hasher.update([command.kind() as u8]);
            match command {
                Command::CreatePath { path } => update_field(&mut hasher, path),
                Command::WriteFile { path, content } => {
                    update_field(&mut hasher, path);
                    update_field(&mut hasher, content);
                }
                Command::Execute { command } => update_field(&mut hasher, command),
            }
        }

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// Length prefixes keep ("ab", "c") and ("a", "bc") apart.
fn update_field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

impl fmt::Display for BatchFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for BatchFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BatchFingerprint({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::BatchFingerprint;
    use crate::protocol::command::Command;

    fn create(path: &str) -> Command {
        Command::CreatePath {
            path: path.to_string(),
        }
    }

    #[test]
    fn equal_batches_share_fingerprint() {
        let batch = vec![create("a"), create("b")];
        assert_eq!(BatchFingerprint::of(&batch), BatchFingerprint::of(&batch.clone()));
    }

    #[test]
    fn order_and_variant_change_fingerprint() {
        let forward = vec![create("a"), create("b")];
        let reversed = vec![create("b"), create("a")];
        let exec = vec![Command::Execute {
            command: "a".to_string(),
        }];

        assert_ne!(BatchFingerprint::of(&forward), BatchFingerprint::of(&reversed));
        assert_ne!(
            BatchFingerprint::of(&[create("a")]),
            BatchFingerprint::of(&exec)
        );
    }

    #[test]
    fn field_boundaries_are_part_of_identity() {
        let left = [Command::WriteFile {
            path: "ab".to_string(),
            content: "c".to_string(),
        }];
        let right = [Command::WriteFile {
            path: "a".to_string(),
            content: "bc".to_string(),
        }];
        assert_ne!(BatchFingerprint::of(&left), BatchFingerprint::of(&right));
    }

    #[test]
    fn display_is_short_hex() {
        let text = BatchFingerprint::of(&[]).to_string();
        assert_eq!(text.len(), 16);
        assert!(text.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
