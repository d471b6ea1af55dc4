//! 规则
//!
//! 规则是配置的不可变表示，启动时构建一次，之后由所有请求共享。

pub mod action;
pub mod aspect;
pub mod bean;
pub mod choose;
pub mod exception;
pub mod item;

pub use action::{
    AnnotatedActionRule, EchoActionRule, HeaderActionRule, IncludeActionRule, InvokeActionRule,
    MethodInvoker, ParameterBindingRule, ParameterType, TransletRequirement,
};
pub use aspect::{AdviceActionRule, AdviceType, AspectAdviceRule, AspectRule, AspectRuleBuilder};
pub use bean::{BeanRule, Scope};
pub use choose::{ChooseRule, ChooseWhenRule};
pub use exception::{ExceptionRule, ExceptionThrownRule, ResponseRule};
pub use item::{ItemRule, ItemRuleMap, ItemType, ItemValueType};
