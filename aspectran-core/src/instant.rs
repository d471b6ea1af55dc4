//! 进程内执行
//!
//! [`ActivityContext`] 持有一个应用的全部共享状态：配置、Bean、类描述、类型转换器以及
//! translet 规则。每个请求创建一个 [`InstantActivity`]，它实现 [`Activity`]，在
//! 切面通知之间执行 translet 的内容，并在失败时交给异常处理规则。
//!
//! ```ignore
//! let context = ActivityContext::builder()
//!     .bean(BeanRule::of("OrderService", OrderService::default))?
//!     .translet(TransletRule::new("order/view").with_content(actions))?
//!     .build()?;
//! let response = context.perform(TransletRequest::new("order/view").with_parameter("id", "7"))?;
//! ```

use crate::action::ActionList;
use crate::activity::{Activity, ItemEvaluator, MethodType, NestedRequest, Translet};
use crate::advice::{self, AspectAdviceResult, AspectAdviceRuleRegistry};
use crate::bean::BeanRegistry;
use crate::config::{Environment, PropertySource};
use crate::convert::{StringifyContext, TypeConverterRegistry};
use crate::error::{ActionError, Result, RuleError};
use crate::expr::{ConditionEvaluator, TokenItemEvaluator};
use crate::process::{ContentList, ProcessResult};
use crate::reflect::{ClassRegistry, MethodResolver};
use crate::rule::aspect::AspectRule;
use crate::rule::bean::BeanRule;
use crate::rule::exception::{ExceptionRule, ExceptionThrownRule};
use crate::util::ToStringBuilder;
use crate::value::{BeanInstance, Value};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;

/// 嵌套 `include` 的最大深度
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// translet 规则：一个请求名称对应的内容、切面与异常处理
#[derive(Debug)]
pub struct TransletRule {
    name: String,
    method: Option<MethodType>,
    content: ContentList,
    aspects: AspectAdviceRuleRegistry,
    exception_rule: Option<ExceptionRule>,
    description: Option<String>,
}

impl TransletRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: None,
            content: ContentList::new(),
            aspects: AspectAdviceRuleRegistry::new(),
            exception_rule: None,
            description: None,
        }
    }

    /// 只响应指定的请求方法
    pub fn with_method(mut self, method: MethodType) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_content(mut self, actions: ActionList) -> Self {
        self.content.push(actions);
        self
    }

    pub fn with_aspect(mut self, aspect: Arc<AspectRule>) -> Self {
        self.aspects.add_aspect_rule(aspect);
        self
    }

    pub fn with_exception_rule(mut self, exception_rule: ExceptionRule) -> Self {
        self.exception_rule = Some(exception_rule);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> Option<MethodType> {
        self.method
    }

    pub fn content(&self) -> &ContentList {
        &self.content
    }

    pub fn aspects(&self) -> &AspectAdviceRuleRegistry {
        &self.aspects
    }

    pub fn exception_rule(&self) -> Option<&ExceptionRule> {
        self.exception_rule.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl fmt::Display for TransletRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("name", Some(&self.name))
            .append("method", self.method)
            .append("contents", Some(self.content.len()))
            .append("aspects", Some(self.aspects.aspect_rule_count()));
        write!(f, "{}", tsb)
    }
}

/// translet 注册表
///
/// 同名规则可以按请求方法区分；查找时先精确匹配方法，再退回未限定方法的规则。
#[derive(Debug, Default)]
pub struct TransletRegistry {
    rules: RwLock<IndexMap<String, Vec<Arc<TransletRule>>>>,
}

impl TransletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, rule: TransletRule) -> Result<Arc<TransletRule>, RuleError> {
        let mut rules = self.rules.write();
        let entries = rules.entry(rule.name.clone()).or_default();
        if entries.iter().any(|r| r.method == rule.method) {
            return Err(RuleError::IllegalRule(format!("Duplicate translet {}", rule)));
        }
        tracing::debug!("Registering translet {}", rule);
        let rule = Arc::new(rule);
        entries.push(Arc::clone(&rule));
        Ok(rule)
    }

    pub fn get(&self, name: &str, method: Option<MethodType>) -> Option<Arc<TransletRule>> {
        let rules = self.rules.read();
        let entries = rules.get(name)?;
        let exact = method.and_then(|m| entries.iter().find(|r| r.method == Some(m)));
        exact
            .or_else(|| entries.iter().find(|r| r.method.is_none()))
            .or_else(|| if method.is_none() { entries.first() } else { None })
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rules.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

/// 应用的共享状态
pub struct ActivityContext {
    environment: Environment,
    beans: BeanRegistry,
    classes: Arc<ClassRegistry>,
    converters: TypeConverterRegistry,
    stringify_context: StringifyContext,
    translets: TransletRegistry,
}

impl ActivityContext {
    pub fn builder() -> ActivityContextBuilder {
        ActivityContextBuilder::new()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn beans(&self) -> &BeanRegistry {
        &self.beans
    }

    pub fn class_registry(&self) -> &Arc<ClassRegistry> {
        &self.classes
    }

    pub fn converters(&self) -> &TypeConverterRegistry {
        &self.converters
    }

    pub fn stringify_context(&self) -> &StringifyContext {
        &self.stringify_context
    }

    pub fn translets(&self) -> &TransletRegistry {
        &self.translets
    }

    /// 不绑定请求的执行上下文，用于在请求之外执行动作
    pub fn new_activity(&self) -> InstantActivity<'_> {
        InstantActivity::new(self, None, 0)
    }

    /// 执行一个请求
    ///
    /// 失败被某个异常处理规则接住时返回带 [`HandledException`] 的响应；否则返回错误。
    pub fn perform(&self, request: TransletRequest) -> Result<TransletResponse> {
        let rule = self.translets.get(&request.name, request.method).ok_or_else(|| {
            ActionError::illegal_argument(format!("No translet mapped to '{}'", request.name))
        })?;
        tracing::debug!(translet = rule.name(), "Performing translet");
        let activity = InstantActivity::new(self, Some(BasicTranslet::from(request)), 0);
        activity.perform(&rule)
    }
}

impl fmt::Debug for ActivityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityContext")
            .field("environment", &self.environment)
            .field("beans", &self.beans)
            .field("translets", &self.translets.len())
            .finish()
    }
}

/// [`ActivityContext`] 构建器
pub struct ActivityContextBuilder {
    environment: Environment,
    classes: Option<Arc<ClassRegistry>>,
    converters: TypeConverterRegistry,
    beans: BeanRegistry,
    translets: TransletRegistry,
}

impl ActivityContextBuilder {
    pub fn new() -> Self {
        Self {
            environment: Environment::new(),
            classes: None,
            converters: TypeConverterRegistry::with_defaults(),
            beans: BeanRegistry::new(),
            translets: TransletRegistry::new(),
        }
    }

    /// 添加配置源到 Environment
    pub fn add_property_source(self, source: Box<dyn PropertySource>) -> Self {
        self.environment.add_property_source(source);
        self
    }

    /// 设置激活的 profiles
    pub fn set_active_profiles(self, profiles: Vec<String>) -> Self {
        self.environment.set_active_profiles(profiles);
        self
    }

    /// 使用指定的类注册表；默认为全局注册表
    pub fn class_registry(mut self, classes: Arc<ClassRegistry>) -> Self {
        self.classes = Some(classes);
        self
    }

    pub fn converters(mut self, converters: TypeConverterRegistry) -> Self {
        self.converters = converters;
        self
    }

    /// 注册 Bean
    pub fn bean(self, rule: BeanRule) -> Result<Self, RuleError> {
        self.beans.register(rule)?;
        Ok(self)
    }

    /// 注册 translet
    pub fn translet(self, rule: TransletRule) -> Result<Self, RuleError> {
        self.translets.register(rule)?;
        Ok(self)
    }

    /// 构建上下文并创建非延迟的单例
    pub fn build(self) -> Result<Arc<ActivityContext>> {
        if self.environment.get_active_profiles().is_empty() {
            self.environment.activate_configured_profiles();
        }
        let stringify_context = StringifyContext::from_environment(&self.environment);
        let context = ActivityContext {
            environment: self.environment,
            beans: self.beans,
            classes: self.classes.unwrap_or_else(ClassRegistry::global),
            converters: self.converters,
            stringify_context,
            translets: self.translets,
        };
        context.beans.initialize_singletons()?;
        tracing::info!(
            "Activity context ready with {} bean(s) and {} translet(s)",
            context.beans.len(),
            context.translets.len()
        );
        Ok(Arc::new(context))
    }
}

impl Default for ActivityContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 一次请求的输入
#[derive(Debug, Clone, Default)]
pub struct TransletRequest {
    name: String,
    method: Option<MethodType>,
    parameters: IndexMap<String, Vec<String>>,
    attributes: IndexMap<String, Value>,
    body: Option<IndexMap<String, Value>>,
}

impl TransletRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: MethodType) -> Self {
        self.method = Some(method);
        self
    }

    /// 追加一个参数值
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// 结构化请求体
    pub fn with_body(mut self, body: IndexMap<String, Value>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 请求上下文的默认实现
#[derive(Debug, Default)]
pub struct BasicTranslet {
    name: String,
    method: Option<MethodType>,
    parameters: IndexMap<String, Vec<String>>,
    body: Option<IndexMap<String, Value>>,
    attributes: RwLock<IndexMap<String, Value>>,
    headers: Mutex<IndexMap<String, Vec<String>>>,
}

impl BasicTranslet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 追加一个参数值
    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters.entry(name.into()).or_default().push(value.into());
    }

    pub fn attributes(&self) -> IndexMap<String, Value> {
        self.attributes.read().clone()
    }

    pub fn headers(&self) -> IndexMap<String, Vec<String>> {
        self.headers.lock().clone()
    }
}

impl From<TransletRequest> for BasicTranslet {
    fn from(request: TransletRequest) -> Self {
        Self {
            name: request.name,
            method: request.method,
            parameters: request.parameters,
            body: request.body,
            attributes: RwLock::new(request.attributes),
            headers: Mutex::new(IndexMap::new()),
        }
    }
}

impl Translet for BasicTranslet {
    fn request_name(&self) -> &str {
        &self.name
    }

    fn request_method(&self) -> MethodType {
        self.method.unwrap_or(MethodType::Get)
    }

    fn get_parameter(&self, name: &str) -> Option<String> {
        self.parameters.get(name).and_then(|values| values.first().cloned())
    }

    fn get_parameter_values(&self, name: &str) -> Option<Vec<String>> {
        self.parameters.get(name).cloned()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.parameters.keys().cloned().collect()
    }

    fn all_parameters(&self) -> IndexMap<String, Vec<String>> {
        self.parameters.clone()
    }

    fn body_as_parameters(&self) -> Option<IndexMap<String, Value>> {
        self.body.clone()
    }

    fn get_attribute(&self, name: &str) -> Option<Value> {
        self.attributes.read().get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: Value) {
        self.attributes.write().insert(name.to_string(), value);
    }

    fn add_header(&self, name: &str, value: &str) {
        self.headers
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    fn header_values(&self, name: &str) -> Vec<String> {
        self.headers.lock().get(name).cloned().unwrap_or_default()
    }
}

/// 被异常处理规则接住的失败
#[derive(Debug)]
pub struct HandledException {
    pub error: ActionError,
    pub rule: Arc<ExceptionThrownRule>,
}

/// 一次请求的输出
#[derive(Debug)]
pub struct TransletResponse {
    pub process_result: ProcessResult,
    pub headers: IndexMap<String, Vec<String>>,
    pub attributes: IndexMap<String, Value>,
    pub handled: Option<HandledException>,
}

impl TransletResponse {
    pub fn is_handled(&self) -> bool {
        self.handled.is_some()
    }
}

/// 进程内的执行上下文
pub struct InstantActivity<'c> {
    context: &'c ActivityContext,
    translet: Option<BasicTranslet>,
    advice_result: AspectAdviceResult,
    depth: usize,
}

impl<'c> InstantActivity<'c> {
    fn new(context: &'c ActivityContext, translet: Option<BasicTranslet>, depth: usize) -> Self {
        Self {
            context,
            translet,
            advice_result: AspectAdviceResult::new(),
            depth,
        }
    }

    /// 在切面通知之间执行 translet 的内容
    pub fn execute(&self, rule: &TransletRule) -> Result<ProcessResult> {
        rule.aspects().run(self, || rule.content().execute(self))
    }

    /// 执行并处理失败
    ///
    /// 先交给 translet 自身的异常规则，再交给切面的异常规则；两者的动作都会执行，
    /// translet 自身命中的规则优先作为响应依据。
    pub fn perform(&self, rule: &TransletRule) -> Result<TransletResponse> {
        let (process_result, handled) = match self.execute(rule) {
            Ok(process_result) => (process_result, None),
            Err(error) => {
                tracing::debug!(translet = rule.name(), "Translet failed; {}", error);
                let own = match rule.exception_rule() {
                    Some(exception_rule) => advice::handle_exception(self, exception_rule, &error)?,
                    None => None,
                };
                let by_aspects = rule.aspects().handle_exception(self, &error)?;
                match own.or(by_aspects) {
                    Some(thrown) => (
                        ProcessResult::new(),
                        Some(HandledException { error, rule: thrown }),
                    ),
                    None => return Err(error),
                }
            }
        };
        let (headers, attributes) = match &self.translet {
            Some(translet) => (translet.headers(), translet.attributes()),
            None => Default::default(),
        };
        Ok(TransletResponse {
            process_result,
            headers,
            attributes,
            handled,
        })
    }
}

impl Activity for InstantActivity<'_> {
    fn translet(&self) -> Option<&dyn Translet> {
        self.translet.as_ref().map(|t| t as &dyn Translet)
    }

    fn get_bean(&self, id: &str) -> Result<BeanInstance> {
        self.context.beans.get_bean(id)
    }

    fn get_bean_by_class(&self, class_name: &str, qualifier: Option<&str>) -> Result<BeanInstance> {
        self.context.beans.get_bean_by_class(class_name, qualifier)
    }

    fn aspect_advice_result(&self) -> &AspectAdviceResult {
        &self.advice_result
    }

    fn item_evaluator(&self) -> Box<dyn ItemEvaluator + '_> {
        Box::new(TokenItemEvaluator::new(self))
    }

    fn evaluate_condition(&self, expression: &str) -> Result<bool> {
        ConditionEvaluator::new(self).evaluate(expression)
    }

    /// 在子上下文中执行另一个 translet
    ///
    /// 子请求继承当前请求的属性，并覆盖为 `include` 给出的属性；子请求添加的响应头
    /// 合并回当前请求。失败原样返回，由外层请求的异常规则处理。
    fn run_nested(&self, request: NestedRequest) -> Result<Option<ProcessResult>> {
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(ActionError::IllegalState(format!(
                "Include depth exceeds {} at translet '{}'",
                MAX_INCLUDE_DEPTH, request.translet_name
            )));
        }
        let method = request
            .method
            .or_else(|| self.translet.as_ref().and_then(|t| t.method));
        let rule = self
            .context
            .translets
            .get(&request.translet_name, method)
            .ok_or_else(|| {
                ActionError::illegal_argument(format!(
                    "No translet mapped to '{}'",
                    request.translet_name
                ))
            })?;

        let mut attributes = self
            .translet
            .as_ref()
            .map(BasicTranslet::attributes)
            .unwrap_or_default();
        attributes.extend(request.attributes);
        let translet = BasicTranslet {
            name: request.translet_name,
            method,
            parameters: request.parameters,
            body: None,
            attributes: RwLock::new(attributes),
            headers: Mutex::new(IndexMap::new()),
        };

        tracing::debug!(translet = rule.name(), depth = self.depth + 1, "Including translet");
        let child = InstantActivity::new(self.context, Some(translet), self.depth + 1);
        let process_result = child.execute(&rule)?;

        if let (Some(parent), Some(nested)) = (&self.translet, &child.translet) {
            for (name, values) in nested.headers() {
                for value in values {
                    parent.add_header(&name, &value);
                }
            }
        }
        Ok((!process_result.is_empty()).then_some(process_result))
    }

    fn method_resolver(&self) -> &dyn MethodResolver {
        &*self.context.classes
    }

    fn class_registry(&self) -> &ClassRegistry {
        &self.context.classes
    }

    fn converters(&self) -> &TypeConverterRegistry {
        &self.context.converters
    }

    fn stringify_context(&self) -> &StringifyContext {
        &self.context.stringify_context
    }

    fn environment(&self) -> &Environment {
        &self.context.environment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{types, Exception};
    use crate::rule::action::{EchoActionRule, HeaderActionRule, IncludeActionRule, InvokeActionRule};
    use crate::rule::choose::{ChooseRule, ChooseWhenRule};
    use crate::rule::exception::ExceptionThrownRule;
    use crate::rule::item::ItemRule;
    use crate::testing::{calculator_registry, Calculator};

    fn context_with(translets: Vec<TransletRule>) -> Arc<ActivityContext> {
        let mut builder = ActivityContext::builder()
            .class_registry(Arc::new(calculator_registry()))
            .bean(BeanRule::of("Calculator", Calculator::default))
            .unwrap();
        for rule in translets {
            builder = builder.translet(rule).unwrap();
        }
        builder.build().unwrap()
    }

    fn echo(action_id: &str, name: &str, text: &str) -> EchoActionRule {
        EchoActionRule::new()
            .with_action_id(action_id)
            .with_item(ItemRule::single(name, text))
    }

    #[test]
    fn test_perform_collects_results() {
        let context = context_with(vec![TransletRule::new("greet").with_content(
            ActionList::new()
                .with(echo("hello", "message", "Hello, ${name:guest}"))
                .with(
                    InvokeActionRule::method_name("greet")
                        .with_bean_id("calculator")
                        .with_action_id("greeting")
                        .with_argument(ItemRule::single("who", "${name}")),
                ),
        )]);
        let response = context
            .perform(TransletRequest::new("greet").with_parameter("name", "kim"))
            .unwrap();
        assert!(!response.is_handled());
        assert_eq!(
            response.process_result.to_value().to_string(),
            "{hello={message=Hello, kim}, greeting=Hello, kim from greet}"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_share_context() {
        let context = context_with(vec![TransletRule::new("greet").with_content(
            ActionList::new().with(
                InvokeActionRule::method_name("greet")
                    .with_bean_id("calculator")
                    .with_action_id("greeting")
                    .with_argument(ItemRule::single("who", "${name}")),
            ),
        )]);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let context = Arc::clone(&context);
                tokio::task::spawn_blocking(move || {
                    let name = format!("user{}", i);
                    let response = context
                        .perform(TransletRequest::new("greet").with_parameter("name", name.as_str()))
                        .unwrap();
                    (name, response.process_result.to_value().to_string())
                })
            })
            .collect();

        for handle in handles {
            let (name, result) = handle.await.unwrap();
            assert_eq!(result, format!("{{greeting=Hello, {} from greet}}", name));
        }
    }

    #[test]
    fn test_unknown_translet() {
        let context = context_with(Vec::new());
        assert!(context.perform(TransletRequest::new("missing")).is_err());
    }

    #[test]
    fn test_method_specific_translets() {
        let context = context_with(vec![
            TransletRule::new("item")
                .with_method(MethodType::Post)
                .with_content(ActionList::new().with(echo("op", "op", "create"))),
            TransletRule::new("item").with_content(ActionList::new().with(echo("op", "op", "read"))),
        ]);
        let post = context
            .perform(TransletRequest::new("item").with_method(MethodType::Post))
            .unwrap();
        assert_eq!(post.process_result.to_value().to_string(), "{op={op=create}}");
        let get = context
            .perform(TransletRequest::new("item").with_method(MethodType::Get))
            .unwrap();
        assert_eq!(get.process_result.to_value().to_string(), "{op={op=read}}");
    }

    #[test]
    fn test_include_choose_and_headers() {
        let context = context_with(vec![
            TransletRule::new("inner").with_content(
                ActionList::new()
                    .with(echo("seen", "value", "${orderId}/@{source}"))
                    .with(HeaderActionRule::new().with_header(ItemRule::single("X-Inner", "yes"))),
            ),
            TransletRule::new("outer").with_content(
                ActionList::new().with(
                    ChooseRule::new()
                        .with_when(
                            ChooseWhenRule::when("${mode} == 'nested'").with_action(
                                IncludeActionRule::new("inner")
                                    .with_action_id("nested")
                                    .with_parameter(ItemRule::single("orderId", "7")),
                            ),
                        )
                        .with_when(ChooseWhenRule::otherwise().with_action(echo("plain", "v", "flat"))),
                ),
            ),
        ]);

        let response = context
            .perform(
                TransletRequest::new("outer")
                    .with_parameter("mode", "nested")
                    .with_attribute("source", "outer"),
            )
            .unwrap();
        assert_eq!(
            response.process_result.to_value().to_string(),
            "{nested={seen={value=7/outer}}}"
        );
        assert_eq!(response.headers["X-Inner"], vec!["yes"]);

        let response = context.perform(TransletRequest::new("outer")).unwrap();
        assert_eq!(response.process_result.to_value().to_string(), "{plain={v=flat}}");
    }

    #[test]
    fn test_include_depth_is_bounded() {
        let context = context_with(vec![TransletRule::new("loop")
            .with_content(ActionList::new().with(IncludeActionRule::new("loop")))]);
        let err = context.perform(TransletRequest::new("loop")).unwrap_err();
        assert!(matches!(err.root_cause(), ActionError::IllegalState(msg) if msg.contains("depth")));
    }

    #[test]
    fn test_failure_handled_by_translet_exception_rule() {
        let failing = InvokeActionRule::method_name("add").with_bean_id("nobody");
        let exception_rule = ExceptionRule::new().with_thrown(
            ExceptionThrownRule::new()
                .with_type(types::NO_SUCH_BEAN.name())
                .with_action(echo("error", "kind", "missing bean")),
        );
        let context = context_with(vec![TransletRule::new("broken")
            .with_content(ActionList::new().with(failing))
            .with_exception_rule(exception_rule)]);

        let response = context.perform(TransletRequest::new("broken")).unwrap();
        let handled = response.handled.expect("handled");
        assert!(matches!(handled.error.root_cause(), ActionError::BeanNotFound(_)));
        assert!(response.process_result.is_empty());
    }

    #[test]
    fn test_unhandled_failure_is_returned() {
        let aspect = AspectRule::builder("audit")
            .thrown(ExceptionThrownRule::new().with_type(types::ILLEGAL_STATE.name()))
            .build();
        let context = context_with(vec![TransletRule::new("broken")
            .with_content(
                ActionList::new().with(InvokeActionRule::method_name("add").with_bean_id("nobody")),
            )
            .with_aspect(aspect)]);
        let err = context.perform(TransletRequest::new("broken")).unwrap_err();
        assert!(matches!(err.root_cause(), ActionError::BeanNotFound(_)));
    }

    #[test]
    fn test_activity_without_translet() {
        let context = context_with(Vec::new());
        let activity = context.new_activity();
        assert!(activity.translet().is_none());
        let bean = activity.get_bean("calculator").unwrap();
        assert!(bean.downcast_ref::<Calculator>().is_some());
        assert!(activity.evaluate_condition("!${anything}").unwrap());
        let raised: ActionError = Exception::illegal_state("x").into();
        assert_eq!(raised.exception_type(), &types::ILLEGAL_STATE);
    }
}
