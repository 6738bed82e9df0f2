//! Alias normalization across languages and spellings
//!
//! Canonicalizes raw floor/room/device-type tokens against per-domain alias
//! tables (English, Chinese, pinyin transliterations) and classifies generic
//! device names ("light", "灯", "lamp") that carry no distinguishing value.
//!
//! Tables are immutable once built; a reverse index from normalized variant
//! to canonical key is precomputed at construction so lookups are O(1).
//! Updating tables at runtime means building a new set and swapping the
//! `Arc` (see [`AliasHandle`]), never editing in place.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Minimum character count on both sides before the containment fallback in
/// [`AliasTable::canonical`] is attempted.
const MIN_CONTAINMENT_CHARS: usize = 3;

/// Normalize a raw token for alias lookup and similarity comparison: trim,
/// strip diacritics, lowercase, and drop separators and any other
/// non-alphanumeric characters. CJK characters survive.
pub fn normalize(raw: &str) -> String {
    raw.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// The alias domains the engine canonicalizes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasDomain {
    Floor,
    Room,
    DeviceType,
}

/// One domain's mapping from canonical key to accepted variants, with a
/// precomputed reverse index for lookup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "BTreeMap<String, Vec<String>>")]
pub struct AliasTable {
    entries: BTreeMap<String, Vec<String>>,
    /// normalized variant -> canonical key; canonical keys index themselves.
    index: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn new(entries: BTreeMap<String, Vec<String>>) -> Self {
        let mut index = BTreeMap::new();
        for (key, variants) in &entries {
            let key_norm = normalize(key);
            if !key_norm.is_empty() {
                index.insert(key_norm, key.clone());
            }
            for variant in variants {
                let variant_norm = normalize(variant);
                if !variant_norm.is_empty() {
                    index.insert(variant_norm, key.clone());
                }
            }
        }
        Self { entries, index }
    }

    /// Resolve a raw token to its canonical key.
    ///
    /// Exact lookup on the normalized token first; on miss, a containment
    /// fallback (token contains or is contained in a variant) gated to
    /// tokens of at least [`MIN_CONTAINMENT_CHARS`] characters on both
    /// sides. Returns `None` when nothing matches, in which case callers
    /// fall back to raw-string comparison.
    pub fn canonical(&self, raw: &str) -> Option<&str> {
        let norm = normalize(raw);
        if norm.is_empty() {
            return None;
        }
        if let Some(key) = self.index.get(&norm) {
            return Some(key.as_str());
        }
        if norm.chars().count() >= MIN_CONTAINMENT_CHARS {
            for (variant, key) in &self.index {
                if variant.chars().count() >= MIN_CONTAINMENT_CHARS
                    && (norm.contains(variant.as_str()) || variant.contains(norm.as_str()))
                {
                    return Some(key.as_str());
                }
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate(&self, domain: &str) -> Result<()> {
        for (key, variants) in &self.entries {
            if variants.iter().all(|v| normalize(v).is_empty()) {
                bail!("alias table `{domain}`: canonical key `{key}` has no usable variants");
            }
        }
        Ok(())
    }
}

impl From<BTreeMap<String, Vec<String>>> for AliasTable {
    fn from(entries: BTreeMap<String, Vec<String>>) -> Self {
        Self::new(entries)
    }
}

impl Serialize for AliasTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

/// Per-device-type sets of generic name tokens.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "BTreeMap<String, Vec<String>>")]
pub struct GenericNames {
    raw: BTreeMap<String, Vec<String>>,
    sets: BTreeMap<String, BTreeSet<String>>,
}

impl GenericNames {
    pub fn new(raw: BTreeMap<String, Vec<String>>) -> Self {
        let sets = raw
            .iter()
            .map(|(key, tokens)| {
                let set = tokens
                    .iter()
                    .map(|t| normalize(t))
                    .filter(|t| !t.is_empty())
                    .collect();
                (key.clone(), set)
            })
            .collect();
        Self { raw, sets }
    }

    /// Whether `token` is a generic name for the given canonical device
    /// type. With no active type, membership in any type's set counts.
    pub fn contains(&self, device_type: Option<&str>, token: &str) -> bool {
        let norm = normalize(token);
        if norm.is_empty() {
            return false;
        }
        match device_type {
            Some(key) => self.sets.get(key).is_some_and(|set| set.contains(&norm)),
            None => self.sets.values().any(|set| set.contains(&norm)),
        }
    }
}

impl From<BTreeMap<String, Vec<String>>> for GenericNames {
    fn from(raw: BTreeMap<String, Vec<String>>) -> Self {
        Self::new(raw)
    }
}

impl Serialize for GenericNames {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.raw.len()))?;
        for (key, tokens) in &self.raw {
            map.serialize_entry(key, tokens)?;
        }
        map.end()
    }
}

/// The full alias configuration: one table per domain plus the generic-name
/// sets. Missing tables in a loaded file fall back to the built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasTables {
    pub floors: AliasTable,
    pub rooms: AliasTable,
    pub device_types: AliasTable,
    pub generic_names: GenericNames,
}

impl Default for AliasTables {
    fn default() -> Self {
        Self {
            floors: default_floors(),
            rooms: default_rooms(),
            device_types: default_device_types(),
            generic_names: default_generic_names(),
        }
    }
}

impl AliasTables {
    /// Resolve a raw token to a canonical key in the given domain.
    pub fn canonicalize(&self, domain: AliasDomain, raw: &str) -> Option<&str> {
        self.table(domain).canonical(raw)
    }

    /// Whether `token` is a generic device name for the active canonical
    /// device type (or for any type when none is active).
    pub fn is_generic(&self, device_type: Option<&str>, token: &str) -> bool {
        self.generic_names.contains(device_type, token)
    }

    fn table(&self, domain: AliasDomain) -> &AliasTable {
        match domain {
            AliasDomain::Floor => &self.floors,
            AliasDomain::Room => &self.rooms,
            AliasDomain::DeviceType => &self.device_types,
        }
    }

    /// Load alias tables from a TOML file. Tables absent from the file keep
    /// their built-in defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading alias tables from {}", path.display()))?;
        let tables: AliasTables = toml::from_str(&raw)
            .with_context(|| format!("parsing alias tables from {}", path.display()))?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn validate(&self) -> Result<()> {
        self.floors.validate("floors")?;
        self.rooms.validate("rooms")?;
        self.device_types.validate("device_types")?;
        Ok(())
    }
}

/// Write a commented starter alias file containing the built-in tables.
pub fn write_default_aliases(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating alias directory {}", parent.display()))?;
    }

    let toml = toml::to_string_pretty(&AliasTables::default())
        .context("serializing default alias tables")?;
    let content = format!(
        "# dmr alias tables\n\
        # File: {}\n\
        #\n\
        # Each table maps a canonical key to its accepted variants in any\n\
        # language or spelling. Lookups are case- and diacritic-insensitive.\n\
        \n\
        {toml}",
        path.display()
    );

    fs::write(path, content).with_context(|| format!("writing aliases to {}", path.display()))
}

/// Shared handle for hot-swapping alias tables.
///
/// Readers take an `Arc` snapshot for the duration of a match; `replace`
/// swaps the whole table set so no in-flight match observes a partial
/// update.
#[derive(Debug)]
pub struct AliasHandle {
    inner: RwLock<Arc<AliasTables>>,
}

impl AliasHandle {
    pub fn new(tables: AliasTables) -> Self {
        Self {
            inner: RwLock::new(Arc::new(tables)),
        }
    }

    pub fn snapshot(&self) -> Arc<AliasTables> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn replace(&self, tables: AliasTables) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(tables);
    }
}

impl Default for AliasHandle {
    fn default() -> Self {
        Self::new(AliasTables::default())
    }
}

fn table(entries: &[(&str, &[&str])]) -> AliasTable {
    AliasTable::new(
        entries
            .iter()
            .map(|(key, variants)| {
                (
                    (*key).to_string(),
                    variants.iter().map(|v| (*v).to_string()).collect(),
                )
            })
            .collect(),
    )
}

fn default_floors() -> AliasTable {
    table(&[
        (
            "1",
            &[
                "一楼",
                "1楼",
                "yilou",
                "first",
                "firstfloor",
                "first_floor",
                "ground",
            ],
        ),
        (
            "2",
            &["二楼", "2楼", "erlou", "second", "secondfloor", "second_floor"],
        ),
        (
            "3",
            &["三楼", "3楼", "sanlou", "third", "thirdfloor", "third_floor"],
        ),
    ])
}

fn default_rooms() -> AliasTable {
    table(&[
        (
            "living_room",
            &["客厅", "keting", "living", "livingroom", "living_room", "lounge"],
        ),
        ("bedroom", &["卧室", "woshi", "bedroom", "bed_room"]),
        (
            "master_bedroom",
            &["主卧", "zhuwo", "master", "masterbedroom", "master_bedroom"],
        ),
        ("kitchen", &["厨房", "chufang", "kitchen"]),
        (
            "bathroom",
            &["浴室", "卫生间", "yushi", "weishengjian", "bathroom", "washroom"],
        ),
        ("study", &["书房", "shufang", "study", "office"]),
        (
            "dining_room",
            &["餐厅", "canting", "dining", "diningroom", "dining_room"],
        ),
        ("garage", &["车库", "cheku", "garage"]),
        (
            "garden",
            &["花园", "后院", "huayuan", "houyuan", "garden", "backyard", "yard"],
        ),
        ("balcony", &["阳台", "yangtai", "balcony"]),
        (
            "entertainment",
            &["娱乐室", "影音室", "yuleshi", "entertainment", "tvroom", "tv_room"],
        ),
    ])
}

fn default_device_types() -> AliasTable {
    table(&[
        ("light", &["light", "lights", "lamp", "deng", "灯"]),
        (
            "switch",
            &["switch", "kaiguan", "开关", "socket", "chazuo", "插座"],
        ),
        ("climate", &["climate", "ac", "aircon", "kongtiao", "空调"]),
        ("fan", &["fan", "fengshan", "风扇"]),
        ("cover", &["cover", "chuanglian", "窗帘"]),
        ("lock", &["lock", "suo", "锁", "门锁"]),
        ("camera", &["camera", "cam", "shexiangtou", "摄像头"]),
        ("sensor", &["sensor", "chuanganqi", "传感器"]),
        (
            "binary_sensor",
            &["binary_sensor", "binarysensor", "presence", "存在", "在家"],
        ),
        ("occupancy", &["occupancy", "occupied", "占用", "占用传感器"]),
        ("motion", &["motion", "运动", "运动传感器", "人体传感器"]),
    ])
}

fn default_generic_names() -> GenericNames {
    let entries: &[(&str, &[&str])] = &[
        (
            "light",
            &["light", "lights", "lamp", "lamps", "deng", "灯", "灯光", "灯具", "照明"],
        ),
        (
            "switch",
            &[
                "switch", "switches", "kaiguan", "开关", "socket", "sockets", "chazuo",
                "插座", "outlet", "plug",
            ],
        ),
        (
            "climate",
            &["ac", "aircon", "kongtiao", "空调", "冷气", "climate"],
        ),
        ("fan", &["fan", "fans", "fengshan", "风扇"]),
        (
            "cover",
            &["cover", "covers", "chuanglian", "窗帘", "curtain", "blind"],
        ),
        ("lock", &["lock", "locks", "suo", "锁", "门锁"]),
        (
            "camera",
            &["camera", "cameras", "cam", "shexiangtou", "摄像头", "监控"],
        ),
        (
            "sensor",
            &[
                "sensor",
                "sensors",
                "chuanganqi",
                "传感器",
                "temperature",
                "temp",
                "wendu",
                "温度",
                "temperaturesensor",
                "温度传感器",
                "humidity",
                "shidu",
                "湿度",
                "湿度传感器",
            ],
        ),
        (
            "occupancy",
            &["occupancy", "zhanyong", "占用", "occupancysensor", "占用传感器"],
        ),
        (
            "motion",
            &["motion", "renti", "人体", "motionsensor", "运动传感器"],
        ),
        (
            "binary_sensor",
            &["door", "menchuang", "门窗", "doorsensor", "门窗传感器", "menci", "门磁"],
        ),
    ];

    GenericNames::new(
        entries
            .iter()
            .map(|(key, tokens)| {
                (
                    (*key).to_string(),
                    tokens.iter().map(|t| (*t).to_string()).collect(),
                )
            })
            .collect(),
    )
}
