//! Local persisted state: a flat string key-value store and the master data
//! (chains, stores, products, claim types, code labels) kept in it as JSON.

use indexmap::IndexMap;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const STORE_DATA_KEY: &str = "storeData";
pub const PRODUCT_DATA_KEY: &str = "productData";
pub const CLAIM_TYPE_DATA_KEY: &str = "claimTypeData";
pub const CODE_NAMES_KEY: &str = "bananaCodeNames";

pub const CODE_FIELD_COUNT: usize = 3;

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Whole store kept as one JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened store {} ({} keys)", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    /// A failed flush leaves the previous value in place.
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        let previous = self.entries.insert(key.to_string(), value);
        if let Err(e) = self.flush() {
            match previous {
                Some(old) => self.entries.insert(key.to_string(), old),
                None => self.entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if let Some(old) = self.entries.remove(key) {
            if let Err(e) = self.flush() {
                self.entries.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }
}

fn load_json<S: KeyValueStore, T: DeserializeOwned>(store: &S, key: &str) -> Result<Option<T>, StoreError> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn save_json<S: KeyValueStore, T: Serialize>(store: &mut S, key: &str, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, raw)
}

fn normalize(name: &str) -> Result<String, StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::EmptyName);
    }
    Ok(trimmed.to_string())
}

fn default_chains() -> IndexMap<String, Vec<String>> {
    [
        ("A-Chain", ["Main Store", "Branch 1", "Branch 2"]),
        ("B-Store", ["Setagaya", "Shibuya", "Shinjuku"]),
        ("C-Market", ["Fuchu", "Chofu", "Kokubunji"]),
    ]
    .into_iter()
    .map(|(chain, stores)| (chain.to_string(), stores.iter().map(|s| s.to_string()).collect()))
    .collect()
}

fn default_products() -> Vec<String> {
    vec!["Banana (bunch)".to_string(), "Banana (single)".to_string()]
}

fn default_claim_types() -> Vec<String> {
    ["Overripe", "Bruise/Scratch", "Rot", "Underripe", "Ki-buku", "Ao-buku", "Other"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_code_label(index: usize) -> String {
    format!("Code {}", index)
}

fn default_code_names() -> BTreeMap<String, String> {
    (1..=CODE_FIELD_COUNT)
        .map(|i| (format!("code{}", i), default_code_label(i)))
        .collect()
}

/// Reference lists the report form draws from. Every mutation is written
/// straight through to the backing store; the in-memory lists only change
/// once that write succeeded.
#[derive(Debug)]
pub struct MasterData<S: KeyValueStore> {
    store: S,
    chains: IndexMap<String, Vec<String>>,
    products: Vec<String>,
    claim_types: Vec<String>,
    code_names: BTreeMap<String, String>,
}

impl<S: KeyValueStore> MasterData<S> {
    /// Loads master data, seeding and persisting defaults for anything missing.
    pub fn load(mut store: S) -> Result<Self, StoreError> {
        let chains = load_json(&store, STORE_DATA_KEY)?.unwrap_or_else(default_chains);
        let products = load_json(&store, PRODUCT_DATA_KEY)?.unwrap_or_else(default_products);
        let claim_types = load_json(&store, CLAIM_TYPE_DATA_KEY)?.unwrap_or_else(default_claim_types);
        let code_names = load_json(&store, CODE_NAMES_KEY)?.unwrap_or_else(default_code_names);

        save_json(&mut store, STORE_DATA_KEY, &chains)?;
        save_json(&mut store, PRODUCT_DATA_KEY, &products)?;
        save_json(&mut store, CLAIM_TYPE_DATA_KEY, &claim_types)?;
        save_json(&mut store, CODE_NAMES_KEY, &code_names)?;

        info!(
            "Master data loaded: {} chains, {} products, {} claim types",
            chains.len(),
            products.len(),
            claim_types.len()
        );

        Ok(Self {
            store,
            chains,
            products,
            claim_types,
            code_names,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn chains(&self) -> Vec<&str> {
        self.chains.keys().map(String::as_str).collect()
    }

    pub fn add_chain(&mut self, name: &str) -> Result<(), StoreError> {
        let name = normalize(name)?;
        if self.chains.contains_key(&name) {
            return Err(StoreError::Duplicate(name));
        }
        let mut chains = self.chains.clone();
        chains.insert(name, Vec::new());
        self.commit_chains(chains)
    }

    /// Removes the chain together with all of its stores.
    pub fn remove_chain(&mut self, name: &str) -> Result<(), StoreError> {
        let mut chains = self.chains.clone();
        if chains.shift_remove(name.trim()).is_none() {
            return Err(StoreError::NotFound(name.trim().to_string()));
        }
        self.commit_chains(chains)
    }

    pub fn stores(&self, chain: &str) -> &[String] {
        self.chains.get(chain).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_store(&mut self, chain: &str, store: &str) -> Result<(), StoreError> {
        let chain = normalize(chain)?;
        let store = normalize(store)?;
        if self.stores(&chain).contains(&store) {
            return Err(StoreError::Duplicate(store));
        }
        let mut chains = self.chains.clone();
        chains.entry(chain).or_default().push(store);
        self.commit_chains(chains)
    }

    pub fn remove_store(&mut self, chain: &str, store: &str) -> Result<(), StoreError> {
        let mut chains = self.chains.clone();
        let stores = chains
            .get_mut(chain.trim())
            .ok_or_else(|| StoreError::NotFound(chain.trim().to_string()))?;
        let before = stores.len();
        stores.retain(|s| s != store.trim());
        if stores.len() == before {
            return Err(StoreError::NotFound(store.trim().to_string()));
        }
        self.commit_chains(chains)
    }

    pub fn products(&self) -> &[String] {
        &self.products
    }

    pub fn add_product(&mut self, name: &str) -> Result<(), StoreError> {
        let mut products = self.products.clone();
        add_unique(&mut products, name)?;
        save_json(&mut self.store, PRODUCT_DATA_KEY, &products)?;
        self.products = products;
        Ok(())
    }

    pub fn remove_product(&mut self, name: &str) -> Result<(), StoreError> {
        let mut products = self.products.clone();
        remove_existing(&mut products, name)?;
        save_json(&mut self.store, PRODUCT_DATA_KEY, &products)?;
        self.products = products;
        Ok(())
    }

    pub fn claim_types(&self) -> &[String] {
        &self.claim_types
    }

    pub fn add_claim_type(&mut self, name: &str) -> Result<(), StoreError> {
        let mut claim_types = self.claim_types.clone();
        add_unique(&mut claim_types, name)?;
        save_json(&mut self.store, CLAIM_TYPE_DATA_KEY, &claim_types)?;
        self.claim_types = claim_types;
        Ok(())
    }

    pub fn remove_claim_type(&mut self, name: &str) -> Result<(), StoreError> {
        let mut claim_types = self.claim_types.clone();
        remove_existing(&mut claim_types, name)?;
        save_json(&mut self.store, CLAIM_TYPE_DATA_KEY, &claim_types)?;
        self.claim_types = claim_types;
        Ok(())
    }

    /// Label shown for free-form code field `index` (1-based).
    pub fn code_label(&self, index: usize) -> Result<String, StoreError> {
        check_code_index(index)?;
        Ok(self
            .code_names
            .get(&format!("code{}", index))
            .filter(|label| !label.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| default_code_label(index)))
    }

    pub fn code_labels(&self) -> [String; CODE_FIELD_COUNT] {
        std::array::from_fn(|i| {
            self.code_label(i + 1)
                .unwrap_or_else(|_| default_code_label(i + 1))
        })
    }

    /// A blank label resets the field to its default name.
    pub fn set_code_label(&mut self, index: usize, label: &str) -> Result<(), StoreError> {
        check_code_index(index)?;
        let label = match label.trim() {
            "" => default_code_label(index),
            trimmed => trimmed.to_string(),
        };
        let mut code_names = self.code_names.clone();
        code_names.insert(format!("code{}", index), label);
        save_json(&mut self.store, CODE_NAMES_KEY, &code_names)?;
        self.code_names = code_names;
        Ok(())
    }

    fn commit_chains(&mut self, chains: IndexMap<String, Vec<String>>) -> Result<(), StoreError> {
        save_json(&mut self.store, STORE_DATA_KEY, &chains)?;
        self.chains = chains;
        Ok(())
    }
}

fn check_code_index(index: usize) -> Result<(), StoreError> {
    if (1..=CODE_FIELD_COUNT).contains(&index) {
        Ok(())
    } else {
        Err(StoreError::InvalidCodeIndex(index))
    }
}

fn add_unique(list: &mut Vec<String>, name: &str) -> Result<(), StoreError> {
    let name = normalize(name)?;
    if list.contains(&name) {
        return Err(StoreError::Duplicate(name));
    }
    list.push(name);
    Ok(())
}

fn remove_existing(list: &mut Vec<String>, name: &str) -> Result<(), StoreError> {
    let name = name.trim();
    let position = list
        .iter()
        .position(|item| item == name)
        .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
    list.remove(position);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Memory store whose writes can be switched to fail like a full disk.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: bool,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
            }
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
            }
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_defaults_are_seeded() {
        let master = MasterData::load(MemoryStore::new()).unwrap();
        assert_eq!(master.chains(), vec!["A-Chain", "B-Store", "C-Market"]);
        assert_eq!(master.stores("B-Store").len(), 3);
        assert_eq!(master.products().len(), 2);
        assert_eq!(master.claim_types().len(), 7);
        assert_eq!(master.code_label(2).unwrap(), "Code 2");

        let store = master.into_store();
        assert!(store.get(STORE_DATA_KEY).unwrap().is_some());
        assert!(store.get(CODE_NAMES_KEY).unwrap().is_some());
    }

    #[test]
    fn test_chain_crud() {
        let mut master = MasterData::load(MemoryStore::new()).unwrap();
        master.add_chain("  D-Mart ").unwrap();
        assert_eq!(master.chains().last(), Some(&"D-Mart"));
        assert!(matches!(master.add_chain("D-Mart"), Err(StoreError::Duplicate(_))));
        assert!(matches!(master.add_chain("   "), Err(StoreError::EmptyName)));

        master.remove_chain("A-Chain").unwrap();
        assert!(master.stores("A-Chain").is_empty());
        assert!(matches!(master.remove_chain("A-Chain"), Err(StoreError::NotFound(_))));
        // order of the remaining chains is kept
        assert_eq!(master.chains(), vec!["B-Store", "C-Market", "D-Mart"]);
    }

    #[test]
    fn test_store_crud() {
        let mut master = MasterData::load(MemoryStore::new()).unwrap();
        master.add_store("C-Market", "Tachikawa").unwrap();
        assert!(master.stores("C-Market").contains(&"Tachikawa".to_string()));
        assert!(matches!(master.add_store("C-Market", "Tachikawa"), Err(StoreError::Duplicate(_))));

        // unknown chain is created on demand
        master.add_store("E-Foods", "Ikebukuro").unwrap();
        assert!(master.chains().contains(&"E-Foods"));

        master.remove_store("C-Market", "Fuchu").unwrap();
        assert!(matches!(master.remove_store("C-Market", "Fuchu"), Err(StoreError::NotFound(_))));
        assert!(matches!(master.remove_store("Z-Chain", "Fuchu"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_products_and_claim_types() {
        let mut master = MasterData::load(MemoryStore::new()).unwrap();
        master.add_product("Banana (organic)").unwrap();
        assert_eq!(master.products().len(), 3);
        master.remove_product("Banana (single)").unwrap();
        assert!(matches!(master.remove_product("Banana (single)"), Err(StoreError::NotFound(_))));

        master.add_claim_type("Mold").unwrap();
        assert!(matches!(master.add_claim_type("Rot"), Err(StoreError::Duplicate(_))));
        master.remove_claim_type("Other").unwrap();
        assert_eq!(master.claim_types().len(), 7);
    }

    #[test]
    fn test_code_labels() {
        let mut master = MasterData::load(MemoryStore::new()).unwrap();
        master.set_code_label(1, "Lot No.").unwrap();
        assert_eq!(master.code_label(1).unwrap(), "Lot No.");
        master.set_code_label(1, "  ").unwrap();
        assert_eq!(master.code_label(1).unwrap(), "Code 1");
        assert!(matches!(master.set_code_label(4, "x"), Err(StoreError::InvalidCodeIndex(4))));
        assert!(matches!(master.code_label(0), Err(StoreError::InvalidCodeIndex(0))));
        assert_eq!(master.code_labels()[2], "Code 3");
    }

    #[test]
    fn test_file_store_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("store.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            let mut master = MasterData::load(store).unwrap();
            master.add_chain("F-Chain").unwrap();
            master.add_product("Plantain").unwrap();
            master.set_code_label(3, "Pallet").unwrap();
        }

        let master = MasterData::load(JsonFileStore::open(&path).unwrap()).unwrap();
        assert!(master.chains().contains(&"F-Chain"));
        assert!(master.products().contains(&"Plantain".to_string()));
        assert_eq!(master.code_label(3).unwrap(), "Pallet");
    }

    #[test]
    fn test_file_store_remove() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        let mut store = JsonFileStore::open(&path).unwrap();
        store.set("k", "v".to_string()).unwrap();
        store.remove("k").unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap(), None);
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Serde(_))));
    }

    #[test]
    fn test_failed_write_keeps_master_data() {
        let mut master = MasterData::load(FlakyStore::default()).unwrap();
        master.store_mut().fail_writes = true;

        assert!(matches!(master.add_chain("D-Mart"), Err(StoreError::Io(_))));
        assert!(matches!(master.remove_chain("A-Chain"), Err(StoreError::Io(_))));
        assert!(matches!(master.add_store("A-Chain", "Branch 3"), Err(StoreError::Io(_))));
        assert!(matches!(master.remove_store("A-Chain", "Branch 1"), Err(StoreError::Io(_))));
        assert!(matches!(master.add_product("Plantain"), Err(StoreError::Io(_))));
        assert!(matches!(master.remove_claim_type("Rot"), Err(StoreError::Io(_))));
        assert!(matches!(master.set_code_label(1, "Lot"), Err(StoreError::Io(_))));

        assert_eq!(master.chains(), vec!["A-Chain", "B-Store", "C-Market"]);
        assert_eq!(master.stores("A-Chain"), ["Main Store", "Branch 1", "Branch 2"]);
        assert_eq!(master.products().len(), 2);
        assert!(master.claim_types().contains(&"Rot".to_string()));
        assert_eq!(master.code_label(1).unwrap(), "Code 1");

        // memory still matches what the store holds
        let persisted: Vec<String> = load_json(master.store(), PRODUCT_DATA_KEY).unwrap().unwrap();
        assert_eq!(persisted, master.products());
    }

    #[test]
    fn test_file_store_failed_flush_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        let mut store = JsonFileStore::open(blocker.join("store.json")).unwrap();
        // a plain file where the parent directory should go makes every flush fail
        std::fs::write(&blocker, "").unwrap();

        assert!(matches!(store.set("k", "v".to_string()), Err(StoreError::Io(_))));
        assert_eq!(store.get("k").unwrap(), None);
    }
}
