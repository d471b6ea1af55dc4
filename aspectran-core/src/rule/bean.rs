use crate::error::ActionError;
use crate::util::naming::{short_name, to_camel_case};
use crate::util::ToStringBuilder;
use crate::value::BeanInstance;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Bean 的作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// 单例模式 - 容器中只有一个实例
    #[default]
    Singleton,

    /// 原型模式 - 每次请求都创建新实例
    Prototype,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Singleton => f.write_str("singleton"),
            Scope::Prototype => f.write_str("prototype"),
        }
    }
}

/// Bean 工厂
pub type BeanFactoryFn = Arc<dyn Fn() -> Result<BeanInstance, ActionError> + Send + Sync>;

/// Bean 规则 - 描述如何创建和管理 Bean
#[derive(Clone)]
pub struct BeanRule {
    /// Bean 的 id；为空时按类名推导
    id: Option<String>,

    /// Bean 的类名（与 `ClassDescriptor` 的名称一致）
    class_name: String,

    scope: Scope,

    factory: BeanFactoryFn,

    /// 是否延迟初始化（仅对单例有效）
    lazy: bool,

    description: Option<String>,
}

impl BeanRule {
    /// 创建新的 Bean 规则
    pub fn new<F>(class_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<BeanInstance, ActionError> + Send + Sync + 'static,
    {
        Self {
            id: None,
            class_name: class_name.into(),
            scope: Scope::default(),
            factory: Arc::new(factory),
            lazy: true,
            description: None,
        }
    }

    /// 以具体类型的构造函数创建
    pub fn of<T, F>(class_name: impl Into<String>, constructor: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(class_name, move || Ok(Arc::new(constructor()) as BeanInstance))
    }

    /// 设置 id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// 设置延迟初始化
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 有效 id：显式 id，或类名的 camelCase 形式
    pub fn id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| to_camel_case(short_name(&self.class_name)))
    }

    pub fn explicit_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_singleton(&self) -> bool {
        self.scope == Scope::Singleton
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// 创建新实例
    pub fn instantiate(&self) -> Result<BeanInstance, ActionError> {
        (self.factory)()
    }
}

impl fmt::Debug for BeanRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanRule")
            .field("id", &self.id)
            .field("class_name", &self.class_name)
            .field("scope", &self.scope)
            .field("lazy", &self.lazy)
            .finish()
    }
}

impl fmt::Display for BeanRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("id", self.id.as_deref())
            .append("class", Some(&self.class_name))
            .append("scope", Some(self.scope))
            .append_if("lazyInit", self.lazy && self.is_singleton());
        write!(f, "{}", tsb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OrderService;

    #[test]
    fn test_default_id_from_class_name() {
        let rule = BeanRule::of("app::OrderService", || OrderService);
        assert_eq!(rule.id(), "orderService");
        assert!(rule.explicit_id().is_none());
        assert!(rule.is_singleton());

        let rule = rule.with_id("orders").with_scope(Scope::Prototype);
        assert_eq!(rule.id(), "orders");
        assert!(!rule.is_singleton());
    }

    #[test]
    fn test_instantiate_creates_fresh_instance() {
        let rule = BeanRule::of("OrderService", || OrderService);
        let a = rule.instantiate().unwrap();
        let b = rule.instantiate().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(a.downcast_ref::<OrderService>().is_some());
        assert_eq!(rule.to_string(), "{class=OrderService, scope=singleton, lazyInit=true}");
    }
}
