use crate::{
    config::{PersistedSettings, StoreLayout},
    ports::{ByteStore, StoreError},
    types::TargetMode,
};

pub const FLAG_TRUE: u8 = 1;
pub const FLAG_FALSE: u8 = 0;
/// Content of a never-written EEPROM cell.
pub const ERASED_BYTE: u8 = 0xFF;

/// Only the canonical `1` reads as true; anything else, including erased
/// cells, falls back to false.
pub fn decode_flag(byte: u8) -> bool {
    byte == FLAG_TRUE
}

pub fn encode_flag(flag: bool) -> u8 {
    if flag {
        FLAG_TRUE
    } else {
        FLAG_FALSE
    }
}

/// Maps [`PersistedSettings`] onto two bytes of a [`ByteStore`].
#[derive(Debug)]
pub struct SettingsStore<S> {
    store: S,
    layout: StoreLayout,
}

impl<S: ByteStore> SettingsStore<S> {
    pub fn new(store: S, layout: StoreLayout) -> Self {
        Self { store, layout }
    }

    pub fn layout(&self) -> StoreLayout {
        self.layout
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Never fails: unreadable or non-canonical bytes restore as false.
    pub fn load(&mut self) -> PersistedSettings {
        let enabled = self.read_flag(self.layout.enabled_address);
        let high = self.read_flag(self.layout.mode_address);
        PersistedSettings {
            enabled,
            mode: TargetMode::from_high_flag(high),
        }
    }

    pub fn save_enabled(&mut self, enabled: bool) -> Result<(), StoreError> {
        self.write_flag(self.layout.enabled_address, enabled)
    }

    pub fn save_mode(&mut self, mode: TargetMode) -> Result<(), StoreError> {
        self.write_flag(self.layout.mode_address, mode.is_high())
    }

    fn read_flag(&mut self, address: u16) -> bool {
        self.store
            .read_byte(address)
            .map(decode_flag)
            .unwrap_or(false)
    }

    // Skips the write when the cell already holds the value.
    fn write_flag(&mut self, address: u16, flag: bool) -> Result<(), StoreError> {
        let value = encode_flag(flag);
        if self.store.read_byte(address) == Ok(value) {
            return Ok(());
        }
        self.store.write_byte(address, value)
    }
}

/// RAM-backed byte store, initialised like a blank EEPROM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStore {
    bytes: Vec<u8>,
}

impl MemoryStore {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![ERASED_BYTE; size],
        }
    }

    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl ByteStore for MemoryStore {
    fn read_byte(&mut self, address: u16) -> Result<u8, StoreError> {
        self.bytes
            .get(usize::from(address))
            .copied()
            .ok_or(StoreError::OutOfRange(address))
    }

    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), StoreError> {
        let cell = self
            .bytes
            .get_mut(usize::from(address))
            .ok_or(StoreError::OutOfRange(address))?;
        *cell = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::FlakyStore;

    #[test]
    fn restores_canonical_bytes() {
        let mut store =
            SettingsStore::new(MemoryStore::with_bytes(vec![1, 0, 0, 0]), StoreLayout::default());

        assert_eq!(
            store.load(),
            PersistedSettings {
                enabled: true,
                mode: TargetMode::Low,
            }
        );
    }

    #[test]
    fn non_canonical_bytes_restore_as_false() {
        let mut store = SettingsStore::new(
            MemoryStore::with_bytes(vec![2, 0, 0xFF, 0]),
            StoreLayout::default(),
        );

        assert_eq!(
            store.load(),
            PersistedSettings {
                enabled: false,
                mode: TargetMode::Low,
            }
        );
    }

    #[test]
    fn unreadable_store_restores_as_false() {
        let mut store = SettingsStore::new(MemoryStore::new(1), StoreLayout::default());
        let settings = store.load();

        assert!(!settings.enabled);
        assert_eq!(settings.mode, TargetMode::Low);
    }

    #[test]
    fn erased_store_restores_default_settings() {
        let mut store = SettingsStore::new(MemoryStore::new(16), StoreLayout::default());

        assert_eq!(store.load(), PersistedSettings::default());
    }

    #[test]
    fn writes_flags_at_layout_addresses() {
        let layout = StoreLayout {
            enabled_address: 5,
            mode_address: 1,
        };
        let mut store = SettingsStore::new(MemoryStore::new(8), layout);

        store.save_enabled(true).unwrap();
        store.save_mode(TargetMode::Low).unwrap();

        assert_eq!(
            store.inner().bytes().to_vec(),
            vec![0xFF, 0, 0xFF, 0xFF, 0xFF, 1, 0xFF, 0xFF]
        );
    }

    #[test]
    fn unchanged_flag_is_not_rewritten() {
        let mut store = SettingsStore::new(
            FlakyStore::new(MemoryStore::with_bytes(vec![1, 0, 1])),
            StoreLayout::default(),
        );

        store.save_enabled(true).unwrap();
        store.save_mode(TargetMode::Low).unwrap();
        assert_eq!(store.inner().writes, 1);
    }

    #[test]
    fn write_failure_is_reported() {
        let mut flaky = FlakyStore::new(MemoryStore::new(4));
        flaky.fail_writes = true;
        let mut store = SettingsStore::new(flaky, StoreLayout::default());

        assert_eq!(store.save_enabled(false), Err(StoreError::WriteRejected));
    }
}
