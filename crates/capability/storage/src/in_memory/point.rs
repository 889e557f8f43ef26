use crate::error::StorageError;
use crate::traits::PointSink;
use domain::{PointValue, PointValueData};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

const DEFAULT_HISTORY_CAPACITY: usize = 1024;

fn point_key(device: &str, point: &str) -> String {
    format!("device:{}:point:{}", device, point)
}

/// 点位内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储。
pub struct InMemoryPointStore {
    last_values: RwLock<HashMap<String, PointValue>>,
    history: RwLock<VecDeque<PointValue>>,
    capacity: usize,
}

impl InMemoryPointStore {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            last_values: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            capacity,
        }
    }

    /// 获取点位最新值
    pub fn last_value(&self, device: &str, point: &str) -> Option<PointValueData> {
        self.last_values
            .read()
            .ok()
            .and_then(|map| map.get(&point_key(device, point)).map(|v| v.value.clone()))
    }

    /// 指定设备的全部最新值
    pub fn list_device(&self, device: &str) -> Vec<PointValue> {
        self.last_values
            .read()
            .map(|map| {
                map.values()
                    .filter(|v| v.device == device)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 最近的推送历史（按时间先后）
    pub fn history(&self) -> Vec<PointValue> {
        self.history
            .read()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 指定点位被推送的次数（限历史窗口内）
    pub fn publish_count(&self, device: &str, point: &str) -> usize {
        self.history
            .read()
            .map(|h| {
                h.iter()
                    .filter(|v| v.device == device && v.point == point)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.last_values.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryPointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PointSink for InMemoryPointStore {
    fn publish(&self, value: PointValue) -> Result<(), StorageError> {
        {
            let mut history = self
                .history
                .write()
                .map_err(|_| StorageError::new("lock failed"))?;
            if self.capacity > 0 {
                while history.len() >= self.capacity {
                    history.pop_front();
                }
                history.push_back(value.clone());
            }
        }
        let mut values = self
            .last_values
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        values.insert(point_key(&value.device, &value.point), value);
        Ok(())
    }
}
