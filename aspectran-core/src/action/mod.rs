//! 可执行动作
//!
//! translet 的内容由有序的动作组成。动作在构建 translet 时创建一次，所有请求共享；
//! 每次执行只通过传入的 [`Activity`] 访问当前请求的状态。

mod annotated;
mod choose;
mod echo;
mod header;
mod include;
mod invoke;
mod invoker;

pub use annotated::{AnnotatedAction, AnnotatedAdviceAction};
pub use choose::ChooseAction;
pub use echo::EchoAction;
pub use header::HeaderAction;
pub use include::IncludeAction;
pub use invoke::{AdviceAction, InvokeAction};
pub use invoker::AnnotatedMethodInvoker;

use crate::activity::Activity;
use crate::error::{ActionError, Result};
use crate::process::{ActionResult, ContentResult, ProcessResult};
use crate::rule::action::{
    AnnotatedActionRule, EchoActionRule, HeaderActionRule, IncludeActionRule, InvokeActionRule,
};
use crate::rule::choose::{ChooseRule, ChooseWhenRule};
use crate::value::{BeanInstance, Value};
use std::fmt;
use std::sync::Arc;

/// 动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Invoke,
    AnnotatedInvoke,
    Advice,
    AnnotatedAdvice,
    Choose,
    Echo,
    Header,
    Include,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Invoke => "invoke",
            ActionType::AnnotatedInvoke => "annotated",
            ActionType::Advice => "advice",
            ActionType::AnnotatedAdvice => "annotated-advice",
            ActionType::Choose => "choose",
            ActionType::Echo => "echo",
            ActionType::Header => "header",
            ActionType::Include => "include",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 动作执行的结果
#[derive(Debug, Clone)]
pub enum Outcome {
    /// 方法或动作产生的值（可以是 `Null`）
    Value(Value),
    /// 无返回值，不计入处理结果
    Void,
    /// `choose` 命中的分支，由调用方在原位执行
    Branch(Arc<ChooseWhenRule>),
    /// 嵌套 translet 的处理结果
    Process(ProcessResult),
}

impl Outcome {
    pub fn is_void(&self) -> bool {
        matches!(self, Outcome::Void)
    }

    /// 取出值；`Void` 与分支为 `None`
    pub fn into_value(self) -> Option<Value> {
        match self {
            Outcome::Value(v) => Some(v),
            Outcome::Process(p) => Some(p.to_value()),
            Outcome::Void | Outcome::Branch(_) => None,
        }
    }
}

/// 可执行动作
pub trait Executable: fmt::Display {
    /// 在给定的执行上下文中执行
    fn execute(&self, activity: &dyn Activity) -> Result<Outcome>;

    /// 结果在处理结果中的标识
    fn action_id(&self) -> Option<&str>;

    /// 结果不计入处理结果
    fn is_hidden(&self) -> bool;

    fn action_type(&self) -> ActionType;
}

/// 所有动作
#[derive(Debug)]
pub enum Action {
    Invoke(InvokeAction),
    Annotated(AnnotatedAction),
    Advice(AdviceAction),
    AnnotatedAdvice(AnnotatedAdviceAction),
    Choose(ChooseAction),
    Echo(EchoAction),
    Header(HeaderAction),
    Include(IncludeAction),
}

impl Action {
    fn as_executable(&self) -> &dyn Executable {
        match self {
            Action::Invoke(a) => a,
            Action::Annotated(a) => a,
            Action::Advice(a) => a,
            Action::AnnotatedAdvice(a) => a,
            Action::Choose(a) => a,
            Action::Echo(a) => a,
            Action::Header(a) => a,
            Action::Include(a) => a,
        }
    }
}

impl Executable for Action {
    fn execute(&self, activity: &dyn Activity) -> Result<Outcome> {
        self.as_executable().execute(activity)
    }

    fn action_id(&self) -> Option<&str> {
        self.as_executable().action_id()
    }

    fn is_hidden(&self) -> bool {
        self.as_executable().is_hidden()
    }

    fn action_type(&self) -> ActionType {
        self.as_executable().action_type()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_executable(), f)
    }
}

macro_rules! impl_from_action {
    ($($variant:ident($action:ty)),* $(,)?) => {
        $(
            impl From<$action> for Action {
                fn from(action: $action) -> Self {
                    Action::$variant(action)
                }
            }
        )*
    };
}

impl_from_action! {
    Invoke(InvokeAction),
    Annotated(AnnotatedAction),
    Advice(AdviceAction),
    AnnotatedAdvice(AnnotatedAdviceAction),
    Choose(ChooseAction),
    Echo(EchoAction),
    Header(HeaderAction),
    Include(IncludeAction),
}

macro_rules! impl_from_rule {
    ($($rule:ty => $action:ident),* $(,)?) => {
        $(
            impl From<$rule> for Action {
                fn from(rule: $rule) -> Self {
                    Action::from($action::new(rule))
                }
            }
        )*
    };
}

impl_from_rule! {
    InvokeActionRule => InvokeAction,
    AnnotatedActionRule => AnnotatedAction,
    ChooseRule => ChooseAction,
    EchoActionRule => EchoAction,
    HeaderActionRule => HeaderAction,
    IncludeActionRule => IncludeAction,
}

/// 有序的动作列表
#[derive(Debug, Default)]
pub struct ActionList {
    name: Option<String>,
    actions: Vec<Action>,
}

impl ActionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            actions: Vec::new(),
        }
    }

    pub fn with(mut self, action: impl Into<Action>) -> Self {
        self.push(action.into());
        self
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    /// 顺序执行，把可见的结果追加到 `result`
    ///
    /// 无返回值与隐藏动作的结果不计入；`choose` 命中的分支在原位执行。
    pub fn execute(&self, activity: &dyn Activity, result: &mut ContentResult) -> Result<()> {
        for action in &self.actions {
            tracing::debug!("Action {}", action);
            match action.execute(activity)? {
                Outcome::Void => {}
                Outcome::Branch(when) => when.actions().execute(activity, result)?,
                outcome => {
                    if !action.is_hidden() {
                        if let Some(value) = outcome.into_value() {
                            result.add_action_result(ActionResult::new(action.action_id(), value));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ActionList {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

/// 解析动作的目标 Bean
///
/// 动作规则上显式指定的类或 id 优先；否则取当前切面的通知 Bean；都没有时失败。
pub(crate) fn resolve_bean(
    activity: &dyn Activity,
    bean_id: Option<&str>,
    bean_class: Option<&str>,
    aspect_id: Option<&str>,
    rule: &dyn fmt::Display,
) -> Result<BeanInstance> {
    if let Some(class_name) = bean_class {
        return activity.get_bean_by_class(class_name, bean_id);
    }
    if let Some(id) = bean_id {
        return activity.get_bean(id);
    }
    if let Some(bean) = aspect_id.and_then(|id| activity.get_aspect_advice_bean(id)) {
        return Ok(bean);
    }
    Err(ActionError::BeanNotFound(format!("Invalid {}", rule)))
}

/// 以动作描述包装失败；已经包装过的失败原样返回
pub(crate) fn wrap_failure(action: &dyn fmt::Display, error: ActionError) -> ActionError {
    match error {
        e @ ActionError::Execution { .. } => e,
        e => ActionError::execution(action, e),
    }
}
