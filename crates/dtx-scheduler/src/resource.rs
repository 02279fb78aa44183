//! Typed lock tables behind a uniform interface

use crate::config::{KeyType, ResourceConfig};
use crate::error::{SchedulerError, SchedulerResult};
use dtx_lock::{
    ApplyOutcome, ClaimLedger, KeyRange, LockRequest, ReleaseOutcome, TableResource,
};
use dtx_metrics::Metrics;
use dtx_primitives::{LockMode, OrderedF32, OrderedF64, TxnId};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::info;

/// A key of any supported table type
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// String key
    Str(String),
    /// 32-bit integer key
    Int(i32),
    /// 64-bit integer key
    Long(i64),
    /// 64-bit float key
    Double(f64),
    /// 32-bit float key
    Float(f32),
}

impl KeyValue {
    /// Key type this value naturally belongs to
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyValue::Str(_) => KeyType::String,
            KeyValue::Int(_) => KeyType::Integer,
            KeyValue::Long(_) => KeyType::Long,
            KeyValue::Double(_) => KeyType::Double,
            KeyValue::Float(_) => KeyType::Float,
        }
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Str(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Str(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        KeyValue::Int(v)
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Long(v)
    }
}

impl From<f64> for KeyValue {
    fn from(v: f64) -> Self {
        KeyValue::Double(v)
    }
}

impl From<f32> for KeyValue {
    fn from(v: f32) -> Self {
        KeyValue::Float(v)
    }
}

/// One range of one table requested by a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRequest {
    /// Table name
    pub table: String,
    /// Left key, inclusive
    pub left: KeyValue,
    /// Right key, exclusive unless equal to `left`
    pub right: KeyValue,
    /// Requested mode
    pub mode: LockMode,
}

impl RangeRequest {
    /// Request `[left, right)` of `table`
    pub fn new(
        table: impl Into<String>,
        left: impl Into<KeyValue>,
        right: impl Into<KeyValue>,
        mode: LockMode,
    ) -> Self {
        Self {
            table: table.into(),
            left: left.into(),
            right: right.into(),
            mode,
        }
    }

    /// Request the single key `key` of `table`
    pub fn point(table: impl Into<String>, key: impl Into<KeyValue>, mode: LockMode) -> Self {
        let key = key.into();
        Self {
            table: table.into(),
            left: key.clone(),
            right: key,
            mode,
        }
    }
}

/// Key types a table can be built for
pub trait TableKey: Ord + Clone + Debug + Send + Sync + 'static {
    /// Configured type name
    const KEY_TYPE: KeyType;

    /// Convert a request key, `Ok(None)` when the value has another type
    fn from_value(value: &KeyValue) -> SchedulerResult<Option<Self>>;
}

impl TableKey for String {
    const KEY_TYPE: KeyType = KeyType::String;

    fn from_value(value: &KeyValue) -> SchedulerResult<Option<Self>> {
        Ok(match value {
            KeyValue::Str(s) => Some(s.clone()),
            _ => None,
        })
    }
}

impl TableKey for i32 {
    const KEY_TYPE: KeyType = KeyType::Integer;

    fn from_value(value: &KeyValue) -> SchedulerResult<Option<Self>> {
        Ok(match value {
            KeyValue::Int(v) => Some(*v),
            KeyValue::Long(v) => i32::try_from(*v).ok(),
            _ => None,
        })
    }
}

impl TableKey for i64 {
    const KEY_TYPE: KeyType = KeyType::Long;

    fn from_value(value: &KeyValue) -> SchedulerResult<Option<Self>> {
        Ok(match value {
            KeyValue::Int(v) => Some(i64::from(*v)),
            KeyValue::Long(v) => Some(*v),
            _ => None,
        })
    }
}

impl TableKey for OrderedF64 {
    const KEY_TYPE: KeyType = KeyType::Double;

    fn from_value(value: &KeyValue) -> SchedulerResult<Option<Self>> {
        match value {
            KeyValue::Double(v) => Ok(Some(OrderedF64::new(*v)?)),
            KeyValue::Float(v) => Ok(Some(OrderedF64::new(f64::from(*v))?)),
            _ => Ok(None),
        }
    }
}

impl TableKey for OrderedF32 {
    const KEY_TYPE: KeyType = KeyType::Float;

    fn from_value(value: &KeyValue) -> SchedulerResult<Option<Self>> {
        match value {
            KeyValue::Float(v) => Ok(Some(OrderedF32::new(*v)?)),
            _ => Ok(None),
        }
    }
}

/// A lock table with its key type erased
pub trait LockTable: Send + Sync {
    /// Table name
    fn name(&self) -> &str;

    /// Configured key type
    fn key_type(&self) -> KeyType;

    /// Apply for every range of `txn` on this table
    fn apply(
        &self,
        txn: TxnId,
        requests: &[&RangeRequest],
        ledger: &mut dyn ClaimLedger,
    ) -> SchedulerResult<ApplyOutcome>;

    /// Release every claim of `txn` on this table
    fn release(&self, txn: TxnId, ledger: &mut dyn ClaimLedger) -> ReleaseOutcome;

    /// Number of segments
    fn segment_count(&self) -> usize;

    /// Whether `txn` holds anything here
    fn holds(&self, txn: TxnId) -> bool;
}

fn convert<K: TableKey>(table: &str, value: &KeyValue) -> SchedulerResult<K> {
    K::from_value(value)?.ok_or_else(|| SchedulerError::KeyTypeMismatch {
        table: table.to_string(),
        expected: K::KEY_TYPE,
        found: value.key_type(),
    })
}

impl<K: TableKey> LockTable for TableResource<K> {
    fn name(&self) -> &str {
        TableResource::name(self)
    }

    fn key_type(&self) -> KeyType {
        K::KEY_TYPE
    }

    fn apply(
        &self,
        txn: TxnId,
        requests: &[&RangeRequest],
        ledger: &mut dyn ClaimLedger,
    ) -> SchedulerResult<ApplyOutcome> {
        let typed = requests
            .iter()
            .map(|r| -> SchedulerResult<LockRequest<K>> {
                let left = convert::<K>(TableResource::name(self), &r.left)?;
                let right = convert::<K>(TableResource::name(self), &r.right)?;
                let range = KeyRange::new(left, right)?;
                Ok(LockRequest::new(range, r.mode))
            })
            .collect::<SchedulerResult<Vec<_>>>()?;
        Ok(self.apply_all(txn, &typed, ledger))
    }

    fn release(&self, txn: TxnId, ledger: &mut dyn ClaimLedger) -> ReleaseOutcome {
        TableResource::release(self, txn, ledger)
    }

    fn segment_count(&self) -> usize {
        self.len()
    }

    fn holds(&self, txn: TxnId) -> bool {
        TableResource::holds(self, txn)
    }
}

/// Build the table described by `config`
pub fn create_table(config: &ResourceConfig, metrics: Option<Arc<Metrics>>) -> Arc<dyn LockTable> {
    fn build<K: TableKey>(name: &str, metrics: Option<Arc<Metrics>>) -> Arc<dyn LockTable> {
        let table = TableResource::<K>::new(name);
        match metrics {
            Some(metrics) => Arc::new(table.with_metrics(metrics)),
            None => Arc::new(table),
        }
    }

    let name = config.table_name.as_str();
    match config.key_type {
        KeyType::String => build::<String>(name, metrics),
        KeyType::Integer => build::<i32>(name, metrics),
        KeyType::Long => build::<i64>(name, metrics),
        KeyType::Double => build::<OrderedF64>(name, metrics),
        KeyType::Float => build::<OrderedF32>(name, metrics),
    }
}

/// The set of tables a scheduler allocates from
#[derive(Default)]
pub struct ResourceManager {
    tables: BTreeMap<String, Arc<dyn LockTable>>,
    metrics: Option<Arc<Metrics>>,
}

impl ResourceManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Record lock counters of every table created from now on
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build one table per definition
    pub fn from_config(
        resources: &[ResourceConfig],
        metrics: Option<Arc<Metrics>>,
    ) -> SchedulerResult<Self> {
        let mut manager = Self {
            tables: BTreeMap::new(),
            metrics,
        };
        for config in resources {
            manager.add(config)?;
        }
        Ok(manager)
    }

    /// Build and register a table
    pub fn add(&mut self, config: &ResourceConfig) -> SchedulerResult<()> {
        let table = create_table(config, self.metrics.clone());
        self.register(table)?;
        info!(
            "Registered table {} with {} keys",
            config.table_name, config.key_type
        );
        Ok(())
    }

    /// Register an existing table
    pub fn register(&mut self, table: Arc<dyn LockTable>) -> SchedulerResult<()> {
        let name = table.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(SchedulerError::DuplicateTable(name));
        }
        self.tables.insert(name, table);
        Ok(())
    }

    /// Look up a table
    pub fn table(&self, name: &str) -> Option<&Arc<dyn LockTable>> {
        self.tables.get(name)
    }

    /// Table names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of tables
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no table is configured
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
