//! 统一的错误处理类型
//!
//! 引擎中的错误分为三类：
//! - [`ActionError`] - 执行动作时产生的运行期错误，`execute` 的统一返回错误
//! - [`RuleError`] - 构建规则时发现的配置错误（在绑定时立即抛出，而不是延迟到执行时）
//! - [`ConfigError`] - 加载配置、初始化日志时的错误
//!
//! 异常处理规则（`ExceptionRule`）按照类型名称匹配异常，因此每个错误都映射到一个
//! [`ExceptionType`] 节点。节点之间构成单继承的类型层级，应用可以用 `static` 声明自己的节点：
//!
//! ```rust
//! use aspectran_core::error::{types, ExceptionType};
//!
//! pub static ORDER_NOT_FOUND: ExceptionType =
//!     ExceptionType::new("com.example.OrderNotFoundException", Some(&types::RUNTIME_EXCEPTION));
//!
//! assert!(ORDER_NOT_FOUND.is_subtype_of(&types::EXCEPTION));
//! ```

use std::fmt;

/// 异常类型节点
///
/// `parent` 为 `None` 的节点是类型层级的根（[`types::THROWABLE`]）。
pub struct ExceptionType {
    name: &'static str,
    parent: Option<&'static ExceptionType>,
}

impl ExceptionType {
    pub const fn new(name: &'static str, parent: Option<&'static ExceptionType>) -> Self {
        Self { name, parent }
    }

    /// 完全限定的类型名称
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 直接父类型
    pub fn parent(&self) -> Option<&'static ExceptionType> {
        self.parent
    }

    /// 是否为类型层级的根
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// 判断当前类型是否与 `other` 相同或是其子类型
    pub fn is_subtype_of(&self, other: &ExceptionType) -> bool {
        if self.name == other.name {
            return true;
        }
        let mut current = self.parent;
        while let Some(t) = current {
            if t.name == other.name {
                return true;
            }
            current = t.parent;
        }
        false
    }
}

impl PartialEq for ExceptionType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ExceptionType {}

impl fmt::Debug for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExceptionType").field(&self.name).finish()
    }
}

impl fmt::Display for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 内置异常类型
pub mod types {
    use super::ExceptionType;

    pub static THROWABLE: ExceptionType = ExceptionType::new("java.lang.Throwable", None);
    pub static EXCEPTION: ExceptionType =
        ExceptionType::new("java.lang.Exception", Some(&THROWABLE));
    pub static RUNTIME_EXCEPTION: ExceptionType =
        ExceptionType::new("java.lang.RuntimeException", Some(&EXCEPTION));

    pub static ILLEGAL_ARGUMENT: ExceptionType =
        ExceptionType::new("java.lang.IllegalArgumentException", Some(&RUNTIME_EXCEPTION));
    pub static NUMBER_FORMAT: ExceptionType =
        ExceptionType::new("java.lang.NumberFormatException", Some(&ILLEGAL_ARGUMENT));
    pub static ILLEGAL_STATE: ExceptionType =
        ExceptionType::new("java.lang.IllegalStateException", Some(&RUNTIME_EXCEPTION));
    pub static UNSUPPORTED_OPERATION: ExceptionType =
        ExceptionType::new("java.lang.UnsupportedOperationException", Some(&RUNTIME_EXCEPTION));
    pub static DATE_TIME_PARSE: ExceptionType =
        ExceptionType::new("java.time.format.DateTimeParseException", Some(&RUNTIME_EXCEPTION));

    pub static BEAN_EXCEPTION: ExceptionType = ExceptionType::new(
        "com.aspectran.core.component.bean.BeanException",
        Some(&RUNTIME_EXCEPTION),
    );
    pub static NO_SUCH_BEAN: ExceptionType = ExceptionType::new(
        "com.aspectran.core.component.bean.NoSuchBeanException",
        Some(&BEAN_EXCEPTION),
    );
    pub static NO_UNIQUE_BEAN: ExceptionType = ExceptionType::new(
        "com.aspectran.core.component.bean.NoUniqueBeanException",
        Some(&NO_SUCH_BEAN),
    );
    pub static NO_SUCH_PROPERTY: ExceptionType =
        ExceptionType::new("com.aspectran.utils.NoSuchPropertyException", Some(&BEAN_EXCEPTION));

    pub static PARAMETER_BINDING: ExceptionType = ExceptionType::new(
        "com.aspectran.core.activity.process.action.ParameterBindingException",
        Some(&RUNTIME_EXCEPTION),
    );
    pub static TYPE_MISMATCH: ExceptionType = ExceptionType::new(
        "com.aspectran.core.activity.process.action.MethodArgumentTypeMismatchException",
        Some(&RUNTIME_EXCEPTION),
    );

    pub static NO_SUCH_METHOD: ExceptionType =
        ExceptionType::new("java.lang.NoSuchMethodException", Some(&EXCEPTION));
    pub static PROCESS: ExceptionType =
        ExceptionType::new("com.aspectran.core.activity.process.ProcessException", Some(&EXCEPTION));
    pub static ACTION_EXECUTION: ExceptionType = ExceptionType::new(
        "com.aspectran.core.activity.process.action.ActionExecutionException",
        Some(&PROCESS),
    );
    pub static ILLEGAL_RULE: ExceptionType = ExceptionType::new(
        "com.aspectran.core.context.rule.IllegalRuleException",
        Some(&EXCEPTION),
    );
}

/// Bean 方法抛出的异常
///
/// 带有类型节点、消息，以及可选的引擎级 cause 或外部错误源。
#[derive(Debug)]
pub struct Exception {
    exception_type: &'static ExceptionType,
    message: String,
    cause: Option<Box<ActionError>>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Exception {
    pub fn new(exception_type: &'static ExceptionType, message: impl Into<String>) -> Self {
        Self {
            exception_type,
            message: message.into(),
            cause: None,
            source: None,
        }
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new(&types::ILLEGAL_ARGUMENT, message)
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new(&types::ILLEGAL_STATE, message)
    }

    pub fn number_format(message: impl Into<String>) -> Self {
        Self::new(&types::NUMBER_FORMAT, message)
    }

    /// 设置引擎级 cause，异常分发会沿着它继续寻找根因
    pub fn with_cause(mut self, cause: ActionError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 附加一个外部错误源（例如 `std::io::Error`），仅用于诊断输出
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn exception_type(&self) -> &'static ExceptionType {
        self.exception_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&ActionError> {
        self.cause.as_deref()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.exception_type.name, self.message)
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Some(cause) = &self.cause {
            return Some(cause.as_ref());
        }
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// 动作执行错误
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// 统一包装：哪个动作失败，以及底层原因
    #[error("Failed to execute action {action}")]
    Execution {
        action: String,
        #[source]
        cause: Box<ActionError>,
    },

    /// 规则无法解析到任何 Bean 实例
    #[error("No such bean; {0}")]
    BeanNotFound(String),

    /// 按类型查找 Bean 时存在多个候选
    #[error("No unique bean of type '{class}' found; candidates: [{}]", .candidates.join(", "))]
    NoUniqueBean { class: String, candidates: Vec<String> },

    /// 按名称动态查找方法时找不到匹配的可访问方法
    #[error("No such accessible method {class}.{method}({})", .arg_types.join(", "))]
    MethodNotFound {
        class: String,
        method: String,
        arg_types: Vec<String>,
    },

    /// Bean 上不存在可写属性
    #[error("No writable property '{property}' on {class}")]
    PropertyNotFound { class: String, property: String },

    /// 注解方法参数绑定失败，指明出错的参数
    #[error("Failed to bind parameter {rule}")]
    ParameterBinding {
        rule: String,
        #[source]
        cause: Box<ActionError>,
    },

    /// 参数值类型转换失败
    #[error("Failed to convert value of type '{source_type}' to required type '{target_type}'")]
    TypeMismatch {
        source_type: String,
        target_type: String,
        #[source]
        cause: Box<ActionError>,
    },

    #[error("{message}")]
    IllegalArgument {
        message: String,
        #[source]
        cause: Option<Box<ActionError>>,
    },

    #[error("{0}")]
    IllegalState(String),

    #[error(transparent)]
    IllegalRule(#[from] RuleError),

    /// Bean 方法抛出的异常
    #[error(transparent)]
    Raised(#[from] Exception),
}

impl ActionError {
    /// 以动作描述包装一个失败
    pub fn execution(action: impl fmt::Display, cause: ActionError) -> Self {
        ActionError::Execution {
            action: action.to_string(),
            cause: Box::new(cause),
        }
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        ActionError::IllegalArgument {
            message: message.into(),
            cause: None,
        }
    }

    pub fn illegal_argument_caused_by(message: impl Into<String>, cause: ActionError) -> Self {
        ActionError::IllegalArgument {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// 错误对应的异常类型节点
    pub fn exception_type(&self) -> &'static ExceptionType {
        match self {
            ActionError::Execution { .. } => &types::ACTION_EXECUTION,
            ActionError::BeanNotFound(_) => &types::NO_SUCH_BEAN,
            ActionError::NoUniqueBean { .. } => &types::NO_UNIQUE_BEAN,
            ActionError::MethodNotFound { .. } => &types::NO_SUCH_METHOD,
            ActionError::PropertyNotFound { .. } => &types::NO_SUCH_PROPERTY,
            ActionError::ParameterBinding { .. } => &types::PARAMETER_BINDING,
            ActionError::TypeMismatch { .. } => &types::TYPE_MISMATCH,
            ActionError::IllegalArgument { .. } => &types::ILLEGAL_ARGUMENT,
            ActionError::IllegalState(_) => &types::ILLEGAL_STATE,
            ActionError::IllegalRule(RuleError::IllegalState(_)) => &types::ILLEGAL_STATE,
            ActionError::IllegalRule(RuleError::IllegalArgument(_)) => &types::ILLEGAL_ARGUMENT,
            ActionError::IllegalRule(RuleError::IllegalRule(_)) => &types::ILLEGAL_RULE,
            ActionError::Raised(e) => e.exception_type(),
        }
    }

    /// 引擎级的直接原因
    pub fn cause(&self) -> Option<&ActionError> {
        match self {
            ActionError::Execution { cause, .. }
            | ActionError::ParameterBinding { cause, .. }
            | ActionError::TypeMismatch { cause, .. } => Some(cause),
            ActionError::IllegalArgument { cause, .. } => cause.as_deref(),
            ActionError::Raised(e) => e.cause(),
            _ => None,
        }
    }

    /// 沿 cause 链找到最深的原因；没有 cause 时返回自身
    pub fn root_cause(&self) -> &ActionError {
        let mut current = self;
        while let Some(next) = current.cause() {
            current = next;
        }
        current
    }

    /// 是否为"找不到方法"错误
    pub fn is_method_not_found(&self) -> bool {
        matches!(self, ActionError::MethodNotFound { .. })
    }
}

/// 规则构建期错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("{0}")]
    IllegalState(String),

    #[error("{0}")]
    IllegalArgument(String),

    #[error("Illegal rule: {0}")]
    IllegalRule(String),
}

/// 配置与日志初始化错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),
}

/// 引擎的结果类型
pub type Result<T, E = ActionError> = std::result::Result<T, E>;
