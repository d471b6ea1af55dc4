// aspectran-core: translet 动作执行与切面通知分发引擎
//
// 提供：
// - 共享、无状态的可执行动作（invoke / annotated / echo / header / include / choose）
// - 注解方法的参数绑定与类型转换
// - before / after / around / finally 通知的排序与执行
// - 按异常类型继承距离选择处理规则的异常分发

pub mod action;
pub mod activity;
pub mod advice;
pub mod bean;
pub mod config;
pub mod convert;
pub mod error;
pub mod expr;
pub mod instant;
pub mod logging;
pub mod process;
pub mod reflect;
pub mod rule;
pub mod token;
pub mod util;
pub mod value;

#[cfg(test)]
mod testing;

// 重新导出常用类型
pub use action::{Action, ActionList, ActionType, Executable, Outcome};
pub use activity::{Activity, ItemEvaluator, MethodType, NestedRequest, Translet};
pub use advice::{AspectAdviceResult, AspectAdviceRuleRegistry};
pub use bean::BeanRegistry;
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use convert::{StringifyContext, TypeConverter, TypeConverterRegistry, TypeKey};
pub use error::{types, ActionError, ConfigError, Exception, ExceptionType, Result, RuleError};
pub use instant::{
    ActivityContext, ActivityContextBuilder, BasicTranslet, HandledException, InstantActivity,
    TransletRequest, TransletResponse, TransletRule,
};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use process::{ActionResult, ContentList, ContentResult, ProcessResult};
pub use reflect::{
    Arguments, ClassDescriptor, ClassRegistry, MethodDescriptor, MethodResolver, ModelDescriptor,
    ModelProperty,
};
pub use value::{BeanInstance, Value, ValueType};

// 导出 inventory，供 submit_class! / submit_model! 使用
pub use inventory;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::action::{ActionList, Executable};
    pub use crate::activity::{Activity, MethodType, Translet};
    pub use crate::config::{ConfigValue, Environment, MapPropertySource, PropertySource};
    pub use crate::convert::TypeKey;
    pub use crate::error::{types, ActionError, Exception, ExceptionType, Result};
    pub use crate::instant::{ActivityContext, TransletRequest, TransletResponse, TransletRule};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::reflect::{ClassDescriptor, ModelDescriptor, ModelProperty};
    pub use crate::rule::{
        AnnotatedActionRule, AspectRule, BeanRule, ChooseRule, ChooseWhenRule, EchoActionRule,
        ExceptionRule, ExceptionThrownRule, HeaderActionRule, IncludeActionRule, InvokeActionRule,
        ItemRule, ItemType, ItemValueType, ParameterBindingRule, ParameterType, ResponseRule, Scope,
    };
    pub use crate::value::{BeanInstance, Value, ValueType};
    pub use crate::{submit_class, submit_model};
}
