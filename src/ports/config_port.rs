//! Configuration access port.

/// Raw `[section] key = value` lookups. Typed parsing and defaults live in
/// `domain::config_validation` so every adapter reports errors the same way.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Section names present in the source, lowercased.
    fn sections(&self) -> Vec<String>;
}
