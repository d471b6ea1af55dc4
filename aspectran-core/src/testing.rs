//! 单元测试共用的夹具

use crate::activity::{Activity, ItemEvaluator, NestedRequest, Translet};
use crate::advice::AspectAdviceResult;
use crate::config::{ConfigValue, Environment, MapPropertySource};
use crate::convert::{StringifyContext, TypeConverterRegistry, TypeKey};
use crate::error::{ActionError, Result};
use crate::expr::{ConditionEvaluator, TokenItemEvaluator};
use crate::instant::BasicTranslet;
use crate::process::ProcessResult;
use crate::reflect::{
    ClassDescriptor, ClassRegistry, MethodDescriptor, MethodResolver, ModelDescriptor, ModelProperty,
    PropertyDescriptor,
};
use crate::value::{BeanInstance, Value, ValueType};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 测试用的组件 Bean
#[derive(Debug, Default)]
pub struct Calculator {
    label: Mutex<String>,
    records: Mutex<Vec<String>>,
}

impl Calculator {
    pub fn label(&self) -> String {
        self.label.lock().clone()
    }

    pub fn records(&self) -> Vec<String> {
        self.records.lock().clone()
    }

    pub fn record_text(&self, text: &str) {
        self.records.lock().push(text.to_string());
    }
}

/// 由请求参数绑定的模型
#[derive(Debug)]
pub struct Order {
    pub item: String,
    pub qty: Option<i32>,
}

pub fn calculator_registry() -> ClassRegistry {
    let registry = ClassRegistry::new();
    registry.register(
        ClassDescriptor::builder::<Calculator>("Calculator")
            .component()
            .method("add", &[ValueType::Long, ValueType::Long], |_, args| {
                let a: i64 = args.get(0)?;
                let b: i64 = args.get(1)?;
                Ok(Value::Long(a + b))
            })
            .method("greet", &[ValueType::Translet, ValueType::String], |_, args| {
                let translet = args.translet(0)?;
                let who: String = args.get(1)?;
                Ok(Value::from(format!("Hello, {} from {}", who, translet.request_name())))
            })
            .method("stamp", &[ValueType::Translet, ValueType::String], |_, args| {
                let who: String = args.get(1)?;
                let request = args.optional_translet(0)?.map(|t| t.request_name().to_string());
                Ok(Value::from(format!("{}@{}", who, request.as_deref().unwrap_or("-"))))
            })
            .method("label", &[], |c: &Calculator, _| Ok(Value::from(c.label())))
            .void_method("reset", &[], |c: &Calculator, _| {
                c.records.lock().clear();
                Ok(())
            })
            .void_method("record", &[ValueType::String], |c: &Calculator, args| {
                let text: String = args.get(0)?;
                c.record_text(&text);
                Ok(())
            })
            .static_method("version", &[], |_| Ok(Value::from("1.0")))
            .property("label", ValueType::String, |c: &Calculator, value| {
                *c.label.lock() = value.to_text().unwrap_or_default();
                Ok(())
            })
            .build(),
    );
    registry.register_model(
        ModelDescriptor::new("Order", |values| {
            Ok(Value::object(Order {
                item: values.get("item").and_then(Value::to_text).unwrap_or_default(),
                qty: values.get("qty").and_then(Value::as_i32),
            }))
        })
        .property(ModelProperty::new("item", TypeKey::STRING).required())
        .property(ModelProperty::new("qty", TypeKey::INT)),
    );
    registry
}

/// 统计方法查找次数的解析器
pub struct CountingResolver {
    inner: Arc<ClassRegistry>,
    lookups: AtomicUsize,
}

impl CountingResolver {
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl MethodResolver for CountingResolver {
    fn find_method(
        &self,
        bean: &BeanInstance,
        name: &str,
        arg_types: &[ValueType],
    ) -> Result<Arc<MethodDescriptor>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_method(bean, name, arg_types)
    }

    fn find_property(&self, bean: &BeanInstance, name: &str) -> Result<Arc<PropertyDescriptor>> {
        self.inner.find_property(bean, name)
    }
}

/// 可配置的执行上下文
///
/// 只有一个名为 `calculator` 的 Bean。条件表达式优先取 `with_condition` 预设的结果，
/// 其余交给真实的求值器。嵌套执行只记录请求并返回预设结果。
pub struct MockActivity {
    translet: Option<BasicTranslet>,
    resolver: CountingResolver,
    calculator: Arc<Calculator>,
    advice_result: AspectAdviceResult,
    conditions: HashMap<String, bool>,
    evaluated: Mutex<Vec<String>>,
    nested_result: Mutex<Option<ProcessResult>>,
    last_nested: Mutex<Option<NestedRequest>>,
    converters: TypeConverterRegistry,
    stringify_context: StringifyContext,
    environment: Environment,
}

impl MockActivity {
    pub fn new() -> Self {
        Self {
            translet: None,
            resolver: CountingResolver {
                inner: Arc::new(calculator_registry()),
                lookups: AtomicUsize::new(0),
            },
            calculator: Arc::new(Calculator::default()),
            advice_result: AspectAdviceResult::new(),
            conditions: HashMap::new(),
            evaluated: Mutex::new(Vec::new()),
            nested_result: Mutex::new(None),
            last_nested: Mutex::new(None),
            converters: TypeConverterRegistry::with_defaults(),
            stringify_context: StringifyContext::default(),
            environment: Environment::new(),
        }
    }

    pub fn with_translet(name: &str) -> Self {
        let mut activity = Self::new();
        activity.translet = Some(BasicTranslet::new(name));
        activity
    }

    /// 追加一个请求参数值
    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        if let Some(translet) = self.translet.as_mut() {
            translet.add_parameter(name, value);
        }
        self
    }

    pub fn with_property(self, key: &str, value: &str) -> Self {
        self.environment.add_property_source(Box::new(
            MapPropertySource::new("test").with_property(key, ConfigValue::String(value.to_string())),
        ));
        self
    }

    pub fn with_condition(mut self, expression: &str, result: bool) -> Self {
        self.conditions.insert(expression.to_string(), result);
        self
    }

    pub fn with_nested_result(self, result: Option<ProcessResult>) -> Self {
        *self.nested_result.lock() = result;
        self
    }

    pub fn evaluated_conditions(&self) -> Vec<String> {
        self.evaluated.lock().clone()
    }

    pub fn last_nested_request(&self) -> Option<NestedRequest> {
        self.last_nested.lock().clone()
    }

    pub fn resolver(&self) -> &CountingResolver {
        &self.resolver
    }

    pub fn calculator(&self) -> Arc<Calculator> {
        Arc::clone(&self.calculator)
    }

    pub fn calculator_bean(&self) -> BeanInstance {
        Arc::clone(&self.calculator) as BeanInstance
    }

    pub fn register_advice_bean(&self, aspect_id: &str, bean: BeanInstance) {
        self.advice_result.put_aspect_advice_bean(aspect_id, bean);
    }
}

impl Activity for MockActivity {
    fn translet(&self) -> Option<&dyn Translet> {
        self.translet.as_ref().map(|t| t as &dyn Translet)
    }

    fn get_bean(&self, id: &str) -> Result<BeanInstance> {
        match id {
            "calculator" => Ok(self.calculator_bean()),
            _ => Err(ActionError::BeanNotFound(format!("No bean named '{}'", id))),
        }
    }

    fn get_bean_by_class(&self, class_name: &str, _qualifier: Option<&str>) -> Result<BeanInstance> {
        match class_name {
            "Calculator" => Ok(self.calculator_bean()),
            _ => Err(ActionError::BeanNotFound(format!("No bean of type '{}'", class_name))),
        }
    }

    fn aspect_advice_result(&self) -> &AspectAdviceResult {
        &self.advice_result
    }

    fn item_evaluator(&self) -> Box<dyn ItemEvaluator + '_> {
        Box::new(TokenItemEvaluator::new(self))
    }

    fn evaluate_condition(&self, expression: &str) -> Result<bool> {
        self.evaluated.lock().push(expression.to_string());
        match self.conditions.get(expression) {
            Some(result) => Ok(*result),
            None => ConditionEvaluator::new(self).evaluate(expression),
        }
    }

    fn run_nested(&self, request: NestedRequest) -> Result<Option<ProcessResult>> {
        *self.last_nested.lock() = Some(request);
        Ok(self.nested_result.lock().take())
    }

    fn method_resolver(&self) -> &dyn MethodResolver {
        &self.resolver
    }

    fn class_registry(&self) -> &ClassRegistry {
        &self.resolver.inner
    }

    fn converters(&self) -> &TypeConverterRegistry {
        &self.converters
    }

    fn stringify_context(&self) -> &StringifyContext {
        &self.stringify_context
    }

    fn environment(&self) -> &Environment {
        &self.environment
    }
}
