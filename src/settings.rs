use serde::{Deserialize, Serialize};

/// What happens to a class when one of its methods cannot be rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodErrorPolicy {
    /// The whole class fails with the method's error.
    #[default]
    Fail,
    /// The method body is replaced by one that throws `java/lang/RuntimeException`.
    Stub,
}

/// Options for a translation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Major version written into the class header
    pub class_version: u16,
    /// Line numbers and local variable names
    pub emit_debug_info: bool,
    pub method_errors: MethodErrorPolicy,
    /// Name of the DEX member inside an archive
    pub archive_entry: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            class_version: 50,
            emit_debug_info: true,
            method_errors: MethodErrorPolicy::Fail,
            archive_entry: "classes.dex".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.class_version, 50);
        assert!(s.emit_debug_info);
        assert_eq!(s.method_errors, MethodErrorPolicy::Fail);
        assert_eq!(s.archive_entry, "classes.dex");
    }
}
