//! 过程映像
//!
//! 单个从站的寄存器/线圈地址空间，共四张表：
//! - 线圈（可被主站写）
//! - 离散输入（只读）
//! - 保持寄存器（可被主站写）
//! - 输入寄存器（只读）
//!
//! 主站写入走 `write_*`，仅在值变化时通知观察者；
//! 本地推送点位值走 `set_*`，不触发通知，避免回声。
//! 等值写入在此丢弃并计入 `dropped_duplicate`。

use crate::error::ProtocolError;
use domain::SlaveId;
use mbsim_telemetry::record_dropped_duplicate;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::trace;

/// 默认无效地址哨兵值
pub const DEFAULT_INVALID_ADDRESS_VALUE: i16 = i16::MIN;

/// 过程映像写入观察者
///
/// 回调在监听器的网络任务上执行，实现方不得阻塞。
pub trait ProcessImageObserver: Send + Sync {
    fn coil_write(&self, offset: u16, old_value: bool, new_value: bool);

    fn holding_register_write(&self, offset: u16, old_value: i16, new_value: i16);
}

#[derive(Debug, Clone, Default)]
struct Tables {
    coils: HashMap<u16, bool>,
    discrete_inputs: HashMap<u16, bool>,
    holding_registers: HashMap<u16, u16>,
    input_registers: HashMap<u16, u16>,
}

/// 过程映像
pub struct ProcessImage {
    slave_id: SlaveId,
    invalid_address_value: RwLock<i16>,
    tables: RwLock<Tables>,
    observers: RwLock<Vec<Arc<dyn ProcessImageObserver>>>,
}

impl ProcessImage {
    /// 创建空映像，哨兵为 [`DEFAULT_INVALID_ADDRESS_VALUE`]
    pub fn new(slave_id: SlaveId) -> Self {
        Self {
            slave_id,
            invalid_address_value: RwLock::new(DEFAULT_INVALID_ADDRESS_VALUE),
            tables: RwLock::new(Tables::default()),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// 以新的从站 ID 重建映像，复制已存储的值，不复制观察者
    pub fn rebind(&self, slave_id: SlaveId) -> Self {
        let tables = self.tables.read().map(|t| t.clone()).unwrap_or_default();
        let image = Self::new(slave_id);
        image.set_invalid_address_value(self.invalid_address_value());
        if let Ok(mut target) = image.tables.write() {
            *target = tables;
        }
        image
    }

    pub fn slave_id(&self) -> SlaveId {
        self.slave_id
    }

    pub fn set_invalid_address_value(&self, value: i16) {
        if let Ok(mut sentinel) = self.invalid_address_value.write() {
            *sentinel = value;
        }
    }

    pub fn invalid_address_value(&self) -> i16 {
        self.invalid_address_value
            .read()
            .map(|v| *v)
            .unwrap_or(DEFAULT_INVALID_ADDRESS_VALUE)
    }

    /// 注册观察者（允许多个）
    pub fn add_listener(&self, observer: Arc<dyn ProcessImageObserver>) -> Result<(), ProtocolError> {
        self.observers
            .write()
            .map_err(|_| ProtocolError::LockPoisoned("process image observers"))?
            .push(observer);
        Ok(())
    }

    /// 移除全部观察者
    pub fn clear_listeners(&self) {
        if let Ok(mut observers) = self.observers.write() {
            observers.clear();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.observers.read().map(|o| o.len()).unwrap_or(0)
    }

    fn sentinel_bit(&self) -> bool {
        self.invalid_address_value() != 0
    }

    fn sentinel_word(&self) -> u16 {
        self.invalid_address_value() as u16
    }

    fn observers(&self) -> Vec<Arc<dyn ProcessImageObserver>> {
        self.observers.read().map(|o| o.clone()).unwrap_or_default()
    }

    // ---- 读取 ----

    pub fn coil(&self, offset: u16) -> bool {
        self.tables
            .read()
            .ok()
            .and_then(|t| t.coils.get(&offset).copied())
            .unwrap_or_else(|| self.sentinel_bit())
    }

    pub fn discrete_input(&self, offset: u16) -> bool {
        self.tables
            .read()
            .ok()
            .and_then(|t| t.discrete_inputs.get(&offset).copied())
            .unwrap_or_else(|| self.sentinel_bit())
    }

    pub fn holding_register(&self, offset: u16) -> u16 {
        self.tables
            .read()
            .ok()
            .and_then(|t| t.holding_registers.get(&offset).copied())
            .unwrap_or_else(|| self.sentinel_word())
    }

    pub fn input_register(&self, offset: u16) -> u16 {
        self.tables
            .read()
            .ok()
            .and_then(|t| t.input_registers.get(&offset).copied())
            .unwrap_or_else(|| self.sentinel_word())
    }

    // ---- 本地设置（不通知） ----

    pub fn set_coil(&self, offset: u16, value: bool) {
        if let Ok(mut t) = self.tables.write() {
            t.coils.insert(offset, value);
        }
    }

    pub fn set_discrete_input(&self, offset: u16, value: bool) {
        if let Ok(mut t) = self.tables.write() {
            t.discrete_inputs.insert(offset, value);
        }
    }

    pub fn set_holding_register(&self, offset: u16, value: u16) {
        if let Ok(mut t) = self.tables.write() {
            t.holding_registers.insert(offset, value);
        }
    }

    pub fn set_input_register(&self, offset: u16, value: u16) {
        if let Ok(mut t) = self.tables.write() {
            t.input_registers.insert(offset, value);
        }
    }

    // ---- 主站写入（变化时通知） ----

    /// 主站写线圈
    pub fn write_coil(&self, offset: u16, value: bool) -> Result<(), ProtocolError> {
        let old = {
            let mut t = self
                .tables
                .write()
                .map_err(|_| ProtocolError::LockPoisoned("process image tables"))?;
            t.coils.insert(offset, value)
        }
        .unwrap_or_else(|| self.sentinel_bit());

        trace!(slave_id = self.slave_id, offset, old, new = value, "coil write");
        if old == value {
            record_dropped_duplicate();
            return Ok(());
        }
        for observer in self.observers() {
            observer.coil_write(offset, old, value);
        }
        Ok(())
    }

    /// 主站写保持寄存器
    pub fn write_holding_register(&self, offset: u16, value: u16) -> Result<(), ProtocolError> {
        let old = {
            let mut t = self
                .tables
                .write()
                .map_err(|_| ProtocolError::LockPoisoned("process image tables"))?;
            t.holding_registers.insert(offset, value)
        }
        .unwrap_or_else(|| self.sentinel_word());

        trace!(slave_id = self.slave_id, offset, old, new = value, "holding register write");
        if old == value {
            record_dropped_duplicate();
            return Ok(());
        }
        for observer in self.observers() {
            observer.holding_register_write(offset, old as i16, value as i16);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProcessImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessImage")
            .field("slave_id", &self.slave_id)
            .field("invalid_address_value", &self.invalid_address_value())
            .field("observers", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        coils: Mutex<Vec<(u16, bool, bool)>>,
        registers: Mutex<Vec<(u16, i16, i16)>>,
    }

    impl ProcessImageObserver for Recorder {
        fn coil_write(&self, offset: u16, old_value: bool, new_value: bool) {
            self.coils.lock().unwrap().push((offset, old_value, new_value));
        }

        fn holding_register_write(&self, offset: u16, old_value: i16, new_value: i16) {
            self.registers
                .lock()
                .unwrap()
                .push((offset, old_value, new_value));
        }
    }

    #[test]
    fn unmapped_reads_return_sentinel() {
        let image = ProcessImage::new(1);
        assert_eq!(image.holding_register(10), 0x8000);
        assert_eq!(image.input_register(10), 0x8000);
        assert!(image.coil(10));

        image.set_invalid_address_value(0);
        assert_eq!(image.holding_register(10), 0);
        assert!(!image.discrete_input(10));
    }

    #[test]
    fn write_notifies_only_on_change() {
        let image = ProcessImage::new(1);
        let recorder = Arc::new(Recorder::default());
        image.add_listener(recorder.clone()).unwrap();

        image.set_holding_register(3, 5);
        image.write_holding_register(3, 5).unwrap();
        image.write_holding_register(3, 0xFFFF).unwrap();
        image.write_holding_register(3, 0xFFFF).unwrap();

        assert_eq!(*recorder.registers.lock().unwrap(), vec![(3, 5, -1)]);
        assert_eq!(image.holding_register(3), 0xFFFF);
    }

    #[test]
    fn equal_writes_are_counted_as_duplicates() {
        let image = ProcessImage::new(1);
        image.set_coil(2, true);
        image.set_holding_register(2, 7);

        let before = mbsim_telemetry::metrics().snapshot().dropped_duplicate;
        image.write_coil(2, true).unwrap();
        image.write_holding_register(2, 7).unwrap();
        let after = mbsim_telemetry::metrics().snapshot().dropped_duplicate;

        assert!(after >= before + 2);
    }

    #[test]
    fn first_coil_write_compares_against_sentinel() {
        let image = ProcessImage::new(1);
        image.set_invalid_address_value(0);
        let recorder = Arc::new(Recorder::default());
        image.add_listener(recorder.clone()).unwrap();

        image.write_coil(0, true).unwrap();
        image.write_coil(0, true).unwrap();

        assert_eq!(*recorder.coils.lock().unwrap(), vec![(0, false, true)]);
    }

    #[test]
    fn set_does_not_notify() {
        let image = ProcessImage::new(1);
        let recorder = Arc::new(Recorder::default());
        image.add_listener(recorder.clone()).unwrap();

        image.set_coil(0, true);
        image.set_holding_register(0, 1);

        assert!(recorder.coils.lock().unwrap().is_empty());
        assert!(recorder.registers.lock().unwrap().is_empty());
    }

    #[test]
    fn rebind_keeps_values_drops_observers() {
        let image = ProcessImage::new(1);
        image.add_listener(Arc::new(Recorder::default())).unwrap();
        image.set_holding_register(4, 42);
        image.set_invalid_address_value(-1);

        let rebound = image.rebind(9);
        assert_eq!(rebound.slave_id(), 9);
        assert_eq!(rebound.holding_register(4), 42);
        assert_eq!(rebound.invalid_address_value(), -1);
        assert_eq!(rebound.listener_count(), 0);
    }
}
