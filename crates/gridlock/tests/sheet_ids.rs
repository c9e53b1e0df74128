use gridlock::{
    FileSettings, MemorySettings, SettingsStore, StableIdMapper, StoreError,
    sheet_ids::{COUNTER_KEY, MAP_KEY},
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

/// In-memory store whose saves can be made to fail.
#[derive(Default)]
struct FlakyStore {
    inner: MemorySettings,
    fail_saves: bool,
}

impl SettingsStore for FlakyStore {
    fn refresh(&mut self) -> Result<(), StoreError> {
        self.inner.refresh()
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.inner.set(key, value);
    }

    fn save(&mut self) -> Result<(), StoreError> {
        if self.fail_saves {
            return Err(StoreError::Rejected("quota exceeded".to_owned()));
        }
        self.inner.save()
    }
}

#[test]
fn assigns_consecutive_ids_in_first_seen_order() {
    let mut mapper = StableIdMapper::open(MemorySettings::new()).unwrap();
    assert_eq!(mapper.get_or_assign("{A}").unwrap(), 1);
    assert_eq!(mapper.get_or_assign("{B}").unwrap(), 2);
    assert_eq!(mapper.get_or_assign("{C}").unwrap(), 3);
}

#[test]
fn same_guid_always_gets_same_id() {
    let mut mapper = StableIdMapper::open(MemorySettings::new()).unwrap();
    let first = mapper.get_or_assign("{A}").unwrap();
    mapper.get_or_assign("{B}").unwrap();
    assert_eq!(mapper.get_or_assign("{A}").unwrap(), first);
    assert_eq!(mapper.get_existing("{A}"), Some(first));
    assert_eq!(mapper.get_existing("{Z}"), None);
}

#[test]
fn each_new_id_is_persisted_before_it_is_returned() {
    let mut mapper = StableIdMapper::open(MemorySettings::new()).unwrap();
    mapper.get_or_assign("{A}").unwrap();
    mapper.get_or_assign("{A}").unwrap();
    mapper.get_or_assign("{B}").unwrap();
    let store = mapper.close().unwrap();
    assert_eq!(store.save_count(), 2);
    assert_eq!(store.get(MAP_KEY), Some(json!({"{A}": 1, "{B}": 2})));
    assert_eq!(store.get(COUNTER_KEY), Some(json!(2)));
}

#[test]
fn reopening_keeps_ids_and_continues_counter() {
    let mut mapper = StableIdMapper::open(MemorySettings::new()).unwrap();
    mapper.get_or_assign("{A}").unwrap();
    mapper.get_or_assign("{B}").unwrap();
    let store = mapper.close().unwrap();

    let mut mapper = StableIdMapper::open(store).unwrap();
    assert_eq!(mapper.get_existing("{B}"), Some(2));
    assert_eq!(mapper.get_or_assign("{C}").unwrap(), 3);
}

#[test]
fn counter_never_trails_largest_stored_id() {
    let mut store = MemorySettings::new();
    store.set(MAP_KEY, json!({"{A}": 7}));
    store.set(COUNTER_KEY, json!(2));
    let mut mapper = StableIdMapper::open(store).unwrap();
    assert_eq!(mapper.get_or_assign("{B}").unwrap(), 8);
}

#[test]
fn corrupt_map_is_rejected() {
    let mut store = MemorySettings::new();
    store.set(MAP_KEY, json!(["not", "a", "map"]));
    assert!(matches!(StableIdMapper::open(store), Err(StoreError::Corrupt(MAP_KEY))));

    let mut store = MemorySettings::new();
    store.set(MAP_KEY, json!({"{A}": 0}));
    assert!(matches!(StableIdMapper::open(store), Err(StoreError::Corrupt(MAP_KEY))));
}

#[test]
fn failed_persist_rolls_back_assignment() {
    let mut mapper = StableIdMapper::open(FlakyStore::default()).unwrap();
    assert_eq!(mapper.get_or_assign("{A}").unwrap(), 1);

    let mut store = mapper.close().unwrap();
    store.fail_saves = true;
    let mut mapper = StableIdMapper::open(store).unwrap();
    assert!(matches!(mapper.get_or_assign("{B}"), Err(StoreError::Rejected(_))));
    assert_eq!(mapper.get_existing("{B}"), None);
    assert_eq!(mapper.all().len(), 1);
}

#[test]
fn batch_resolve_assigns_in_order_and_persists_once() {
    let mut mapper = StableIdMapper::open(MemorySettings::new()).unwrap();
    mapper.get_or_assign("{A}").unwrap();
    let ids = mapper.batch_resolve(["{B}", "{A}", "{C}", "{B}"]).unwrap();
    assert_eq!(ids.get("{A}"), Some(&1));
    assert_eq!(ids.get("{B}"), Some(&2));
    assert_eq!(ids.get("{C}"), Some(&3));
    assert_eq!(ids.len(), 3);
    let store = mapper.close().unwrap();
    assert_eq!(store.save_count(), 2);
}

#[test]
fn batch_resolve_of_known_ids_does_not_save() {
    let mut mapper = StableIdMapper::open(MemorySettings::new()).unwrap();
    mapper.get_or_assign("{A}").unwrap();
    mapper.batch_resolve(["{A}"]).unwrap();
    assert_eq!(mapper.close().unwrap().save_count(), 1);
}

#[test]
fn batch_resolve_rolls_back_whole_batch() {
    let mut mapper = StableIdMapper::open(FlakyStore::default()).unwrap();
    mapper.get_or_assign("{A}").unwrap();
    let mut store = mapper.close().unwrap();
    store.fail_saves = true;

    let mut mapper = StableIdMapper::open(store).unwrap();
    assert!(mapper.batch_resolve(["{B}", "{C}"]).is_err());
    assert_eq!(mapper.all().keys().collect::<Vec<_>>(), vec!["{A}"]);
}

#[test]
fn exhausted_counter_is_an_error_not_a_wrap() {
    let mut store = MemorySettings::new();
    store.set(MAP_KEY, json!({"{A}": 1}));
    store.set(COUNTER_KEY, json!(u32::MAX - 1));
    let mut mapper = StableIdMapper::open(store).unwrap();

    assert_eq!(mapper.get_or_assign("{B}").unwrap(), u32::MAX);
    assert!(matches!(mapper.get_or_assign("{C}"), Err(StoreError::Exhausted(u32::MAX))));
    assert_eq!(mapper.get_existing("{C}"), None);
    assert_eq!(mapper.get_or_assign("{A}").unwrap(), 1);

    assert!(matches!(mapper.batch_resolve(["{A}", "{D}", "{E}"]), Err(StoreError::Exhausted(_))));
    assert_eq!(mapper.all().keys().collect::<Vec<_>>(), vec!["{A}", "{B}"]);
    let store = mapper.close().unwrap();
    assert_eq!(store.get(COUNTER_KEY), Some(json!(u32::MAX)));
}

#[test]
fn clear_restarts_numbering() {
    let mut mapper = StableIdMapper::open(MemorySettings::new()).unwrap();
    mapper.get_or_assign("{A}").unwrap();
    mapper.get_or_assign("{B}").unwrap();
    mapper.clear().unwrap();
    assert!(mapper.all().is_empty());
    assert_eq!(mapper.get_or_assign("{B}").unwrap(), 1);
}

#[test]
fn file_settings_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    let mut mapper = StableIdMapper::open(FileSettings::open(&path).unwrap()).unwrap();
    mapper.get_or_assign("{A}").unwrap();
    mapper.get_or_assign("{B}").unwrap();
    drop(mapper);
    assert!(path.exists());

    let mut mapper = StableIdMapper::open(FileSettings::open(&path).unwrap()).unwrap();
    assert_eq!(mapper.all().into_iter().collect::<Vec<_>>(), vec![("{A}".to_owned(), 1), ("{B}".to_owned(), 2)]);
    assert_eq!(mapper.get_or_assign("{C}").unwrap(), 3);
}

#[test]
fn file_settings_missing_file_reads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSettings::open(dir.path().join("absent.json")).unwrap();
    assert_eq!(store.get(MAP_KEY), None);
}

#[test]
fn file_settings_rejects_invalid_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(matches!(FileSettings::open(&path), Err(StoreError::Json(_))));
}
