//! Bean 注册表
//!
//! 按 id 保存 [`BeanRule`]，单例实例在首次访问时创建并缓存。实例的创建总在锁外进行，
//! 并发创建同一单例时先写入缓存的实例胜出。

use crate::error::{ActionError, Result, RuleError};
use crate::rule::bean::BeanRule;
use crate::util::naming::short_name;
use crate::value::BeanInstance;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Bean 注册表
#[derive(Default)]
pub struct BeanRegistry {
    /// Bean 规则（按注册顺序）
    rules: RwLock<IndexMap<String, BeanRule>>,

    /// 单例 Bean 缓存
    singletons: RwLock<HashMap<String, BeanInstance>>,
}

impl BeanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 Bean 规则；id 重复时返回错误
    pub fn register(&self, rule: BeanRule) -> Result<(), RuleError> {
        let id = rule.id();
        let mut rules = self.rules.write();
        if rules.contains_key(&id) {
            return Err(RuleError::IllegalRule(format!(
                "Duplicate bean id '{}'; {}",
                id, rule
            )));
        }
        tracing::debug!("Registering bean '{}' of class '{}'", id, rule.class_name());
        rules.insert(id, rule);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rules.read().contains_key(id)
    }

    pub fn bean_ids(&self) -> Vec<String> {
        self.rules.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// 创建所有非延迟的单例
    pub fn initialize_singletons(&self) -> Result<()> {
        let eager: Vec<String> = self
            .rules
            .read()
            .iter()
            .filter(|(_, rule)| rule.is_singleton() && !rule.is_lazy())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &eager {
            self.get_bean(id)?;
        }
        tracing::info!("Initialized {} eager singleton bean(s)", eager.len());
        Ok(())
    }

    /// 按 id 取 Bean
    pub fn get_bean(&self, id: &str) -> Result<BeanInstance> {
        let rule = self
            .rules
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ActionError::BeanNotFound(format!("No bean named '{}'", id)))?;
        self.instance_of(id, &rule)
    }

    /// 按类名取 Bean
    ///
    /// 类名可以是完整名称或短名称。存在多个候选时按 `qualifier`（Bean id）区分。
    pub fn get_bean_by_class(&self, class_name: &str, qualifier: Option<&str>) -> Result<BeanInstance> {
        let candidates: Vec<(String, BeanRule)> = self
            .rules
            .read()
            .iter()
            .filter(|(_, rule)| {
                rule.class_name() == class_name || short_name(rule.class_name()) == class_name
            })
            .map(|(id, rule)| (id.clone(), rule.clone()))
            .collect();

        let (id, rule) = match candidates.len() {
            0 => {
                return Err(ActionError::BeanNotFound(format!(
                    "No bean of type '{}'",
                    class_name
                )))
            }
            1 => candidates.into_iter().next().ok_or_else(|| {
                ActionError::IllegalState(format!("Lost candidate for type '{}'", class_name))
            })?,
            _ => match qualifier {
                Some(q) => candidates
                    .into_iter()
                    .find(|(id, _)| id == q)
                    .ok_or_else(|| {
                        ActionError::BeanNotFound(format!(
                            "No bean of type '{}' named '{}'",
                            class_name, q
                        ))
                    })?,
                None => {
                    return Err(ActionError::NoUniqueBean {
                        class: class_name.to_string(),
                        candidates: candidates.into_iter().map(|(id, _)| id).collect(),
                    })
                }
            },
        };
        self.instance_of(&id, &rule)
    }

    fn instance_of(&self, id: &str, rule: &BeanRule) -> Result<BeanInstance> {
        if !rule.is_singleton() {
            tracing::trace!("Creating new instance of prototype bean '{}'", id);
            return rule.instantiate();
        }
        if let Some(bean) = self.singletons.read().get(id) {
            return Ok(BeanInstance::clone(bean));
        }

        let created = rule.instantiate()?;
        let mut singletons = self.singletons.write();
        let bean = singletons
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!("Created singleton bean '{}'", id);
                created
            });
        Ok(BeanInstance::clone(bean))
    }
}

impl std::fmt::Debug for BeanRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanRegistry")
            .field("beans", &self.bean_ids())
            .field("singletons", &self.singletons.read().len())
            .finish()
    }
}
