//! Working configuration for the ticker
//!
//! [`ConfigParameters`] holds the two user-editable fields that survive a
//! reboot: the access key for the quote service and the list of symbols to
//! track. Both live in fixed-capacity buffers; every write goes through a
//! bounded copy that truncates instead of failing.

use core::fmt;
use heapless::String;

/// Maximum length in bytes of the data-service access key.
pub const CREDENTIAL_KEY_CAPACITY: usize = 40;

/// Maximum length in bytes of the comma-separated symbol list.
pub const SYMBOL_LIST_CAPACITY: usize = 54;

/// Maximum number of symbols the ticker will track.
pub const MAX_SYMBOLS: usize = 10;

/// Longest symbol the display layout is designed for.
pub const MAX_SYMBOL_LEN: usize = 5;

/// Identifies one of the editable configuration fields.
///
/// The same identifiers are used as storage keys and as portal form names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    CredentialKey,
    SymbolList,
}

impl FieldId {
    pub const ALL: [FieldId; 2] = [FieldId::CredentialKey, FieldId::SymbolList];

    /// Storage key and form field name
    pub const fn key(self) -> &'static str {
        match self {
            Self::CredentialKey => "credential_key",
            Self::SymbolList => "symbols",
        }
    }

    /// Label shown next to the field in the configuration portal
    pub const fn label(self) -> &'static str {
        match self {
            Self::CredentialKey => "Quote service API key",
            Self::SymbolList => "Stock symbols (max 10, comma separated, e.g. AAPL,AMZN)",
        }
    }

    pub const fn capacity(self) -> usize {
        match self {
            Self::CredentialKey => CREDENTIAL_KEY_CAPACITY,
            Self::SymbolList => SYMBOL_LIST_CAPACITY,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::CredentialKey => 0,
            Self::SymbolList => 1,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }
}

/// The persisted and working configuration of the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigParameters {
    credential_key: String<CREDENTIAL_KEY_CAPACITY>,
    symbol_list: String<SYMBOL_LIST_CAPACITY>,
}

impl ConfigParameters {
    /// Build a configuration from raw values, truncating anything that does not fit.
    pub fn new(credential_key: &str, symbol_list: &str) -> Self {
        let mut config = Self::default();
        config.set_credential_key(credential_key);
        config.set_symbol_list(symbol_list);
        config
    }

    pub fn credential_key(&self) -> &str {
        &self.credential_key
    }

    pub fn symbol_list(&self) -> &str {
        &self.symbol_list
    }

    /// Replace the access key. Returns `true` if the input had to be truncated.
    pub fn set_credential_key(&mut self, value: &str) -> bool {
        copy_bounded(&mut self.credential_key, value.trim())
    }

    /// Replace the symbol list. Returns `true` if the input had to be truncated.
    ///
    /// Oversize lists are cut after the last complete entry that fits both the
    /// byte capacity and [`MAX_SYMBOLS`].
    pub fn set_symbol_list(&mut self, value: &str) -> bool {
        let value = value.trim();
        let fitted = fit_symbol_list(value);
        copy_bounded(&mut self.symbol_list, fitted);
        fitted.len() < value.len()
    }

    pub fn field(&self, id: FieldId) -> &str {
        match id {
            FieldId::CredentialKey => self.credential_key(),
            FieldId::SymbolList => self.symbol_list(),
        }
    }

    pub fn set_field(&mut self, id: FieldId, value: &str) -> bool {
        match id {
            FieldId::CredentialKey => self.set_credential_key(value),
            FieldId::SymbolList => self.set_symbol_list(value),
        }
    }

    /// Non-empty, trimmed entries of the symbol list
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbol_list
            .split(',')
            .map(str::trim)
            .filter(|symbol| !symbol.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.credential_key.is_empty() && self.symbol_list.is_empty()
    }

    /// Log-safe view of the access key
    pub fn masked_key(&self) -> MaskedKey<'_> {
        MaskedKey(&self.credential_key)
    }
}

/// Displays only the first few characters of a secret.
pub struct MaskedKey<'a>(&'a str);

impl fmt::Display for MaskedKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const VISIBLE: usize = 4;
        if self.0.is_empty() {
            return f.write_str("<empty>");
        }
        if self.0.chars().count() <= VISIBLE {
            return f.write_str("****");
        }
        let cut = self.0.char_indices().nth(VISIBLE).map_or(self.0.len(), |(i, _)| i);
        write!(f, "{}****", &self.0[..cut])
    }
}

/// Largest index `<= max` that lies on a character boundary of `s`.
pub fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut index = max;
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Copy `value` into `dst`, cutting at the last character boundary that fits.
///
/// Returns `true` if anything was cut off.
pub fn copy_bounded<const N: usize>(dst: &mut String<N>, value: &str) -> bool {
    dst.clear();
    let cut = floor_char_boundary(value, N);
    // Cannot fail: `cut <= N`.
    let _ = dst.push_str(&value[..cut]);
    cut < value.len()
}

/// Longest prefix of `value` made of whole comma-delimited entries that fits.
fn fit_symbol_list(value: &str) -> &str {
    let mut fitted = None;
    let mut start = 0usize;
    for (index, entry) in value.split(',').enumerate() {
        let end = start + entry.len();
        if index >= MAX_SYMBOLS || end > SYMBOL_LIST_CAPACITY {
            break;
        }
        fitted = Some(end);
        start = end + 1;
    }

    match fitted {
        Some(end) => &value[..end],
        // Not even the first entry fits, fall back to a plain cut.
        None => &value[..floor_char_boundary(value, SYMBOL_LIST_CAPACITY)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keeps_values_within_capacity() {
        let config = ConfigParameters::new("abc123", "AAPL,AMZN");
        assert_eq!(config.credential_key(), "abc123");
        assert_eq!(config.symbol_list(), "AAPL,AMZN");
    }

    #[test]
    fn test_credential_key_truncated_to_capacity() {
        let mut config = ConfigParameters::default();
        let long = "k".repeat(CREDENTIAL_KEY_CAPACITY + 10);
        assert!(config.set_credential_key(&long));
        assert_eq!(config.credential_key().len(), CREDENTIAL_KEY_CAPACITY);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut buf: String<5> = String::new();
        // "é" is two bytes; the cut must not split it.
        assert!(copy_bounded(&mut buf, "abcdé"));
        assert_eq!(buf.as_str(), "abcd");
    }

    #[test]
    fn test_symbol_list_cut_at_last_whole_entry() {
        let mut config = ConfigParameters::default();
        // 9 x "ABCDE," = 54 bytes, so the 9th entry ends at byte 53.
        let list = "ABCDE,".repeat(9) + "FGHIJ";
        assert!(config.set_symbol_list(&list));
        assert!(config.symbol_list().len() <= SYMBOL_LIST_CAPACITY);
        assert!(!config.symbol_list().ends_with(','));
        assert_eq!(config.symbols().count(), 9);
        assert!(config.symbols().all(|s| s == "ABCDE"));
    }

    #[test]
    fn test_symbol_list_limited_to_max_symbols() {
        let mut config = ConfigParameters::default();
        assert!(config.set_symbol_list("A,B,C,D,E,F,G,H,I,J,K,L"));
        assert_eq!(config.symbol_list(), "A,B,C,D,E,F,G,H,I,J");
        assert_eq!(config.symbols().count(), MAX_SYMBOLS);
    }

    #[test]
    fn test_single_oversize_symbol_falls_back_to_plain_cut() {
        let mut config = ConfigParameters::default();
        let giant = "X".repeat(80);
        assert!(config.set_symbol_list(&giant));
        assert_eq!(config.symbol_list().len(), SYMBOL_LIST_CAPACITY);
    }

    #[test]
    fn test_whitespace_is_trimmed_without_reporting_truncation() {
        let mut config = ConfigParameters::default();
        assert!(!config.set_symbol_list("  AAPL, MSFT  "));
        assert_eq!(config.symbol_list(), "AAPL, MSFT");
        let symbols: heapless::Vec<&str, 4> = config.symbols().collect();
        assert_eq!(symbols.as_slice(), &["AAPL", "MSFT"]);
    }

    #[test]
    fn test_field_ids_round_trip_through_keys() {
        for field in FieldId::ALL {
            assert_eq!(FieldId::from_key(field.key()), Some(field));
        }
        assert_eq!(FieldId::from_key("ssid"), None);
        assert!(FieldId::SymbolList.label().contains("10"));
        assert!(FieldId::SymbolList.label().contains("AAPL,AMZN"));
    }

    #[test]
    fn test_masked_key_hides_secret() {
        use alloc::format;

        let config = ConfigParameters::new("abcdef123456", "");
        assert_eq!(format!("{}", config.masked_key()), "abcd****");
        let short = ConfigParameters::new("abc", "");
        assert_eq!(format!("{}", short.masked_key()), "****");
        let empty = ConfigParameters::default();
        assert_eq!(format!("{}", empty.masked_key()), "<empty>");
    }
}
