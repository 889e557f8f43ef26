//! 点位注册表：偏移 → 点位描述
//!
//! 线圈与寄存器共用一张表，由点位数据类型区分。
//! 点位只追加或覆盖，不单独删除；设备移除时整体丢弃。

use mbsim_protocol::PointDataType;
use std::collections::HashMap;
use std::sync::RwLock;

/// 点位描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointDescriptor {
    pub name: String,
    pub data_type: PointDataType,
}

#[derive(Debug, Default)]
pub struct PointRegistry {
    points: RwLock<HashMap<u16, PointDescriptor>>,
}

impl PointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定点位；同一偏移重复绑定时覆盖，返回旧描述
    pub fn bind(
        &self,
        offset: u16,
        name: impl Into<String>,
        data_type: PointDataType,
    ) -> Option<PointDescriptor> {
        let descriptor = PointDescriptor {
            name: name.into(),
            data_type,
        };
        self.points
            .write()
            .ok()
            .and_then(|mut points| points.insert(offset, descriptor))
    }

    pub fn resolve(&self, offset: u16) -> Option<PointDescriptor> {
        self.points
            .read()
            .ok()
            .and_then(|points| points.get(&offset).cloned())
    }

    /// 按名称查找，返回偏移与描述
    pub fn find_by_name(&self, name: &str) -> Option<(u16, PointDescriptor)> {
        self.points.read().ok().and_then(|points| {
            points
                .iter()
                .find(|(_, d)| d.name == name)
                .map(|(offset, d)| (*offset, d.clone()))
        })
    }

    pub fn len(&self) -> usize {
        self.points.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebind_overwrites() {
        let registry = PointRegistry::new();
        assert!(registry.bind(1, "speed", PointDataType::Int16).is_none());

        let previous = registry.bind(1, "label", PointDataType::CharString);
        assert_eq!(previous.map(|d| d.name), Some("speed".to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.resolve(1),
            Some(PointDescriptor {
                name: "label".to_string(),
                data_type: PointDataType::CharString,
            })
        );
    }

    #[test]
    fn resolve_unmapped() {
        let registry = PointRegistry::new();
        assert!(registry.resolve(9).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn find_by_name() {
        let registry = PointRegistry::new();
        registry.bind(4, "run", PointDataType::Binary);
        registry.bind(5, "speed", PointDataType::Int16);

        let (offset, descriptor) = registry.find_by_name("speed").unwrap();
        assert_eq!(offset, 5);
        assert_eq!(descriptor.data_type, PointDataType::Int16);
        assert!(registry.find_by_name("missing").is_none());
    }
}
