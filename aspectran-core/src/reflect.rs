//! 运行期类描述
//!
//! 按名称调用 Bean 方法、设置属性、绑定模型对象都依赖运行期的类型信息。
//! 每个可被动作调用的类型用 [`ClassDescriptor`] 描述一次，注册到 [`ClassRegistry`]：
//!
//! ```rust
//! use aspectran_core::reflect::{Arguments, ClassDescriptor};
//! use aspectran_core::value::{Value, ValueType};
//!
//! struct Greeter;
//!
//! let descriptor = ClassDescriptor::builder::<Greeter>("Greeter")
//!     .method("greet", &[ValueType::String], |_greeter: &Greeter, args: Arguments<'_>| {
//!         let name: String = args.get(0)?;
//!         Ok(Value::from(format!("Hello, {}", name)))
//!     })
//!     .build();
//!
//! assert_eq!(descriptor.methods().len(), 1);
//! ```
//!
//! 也可以在编译期用 [`submit_class!`](crate::submit_class) 提交描述函数，
//! 由 [`ClassRegistry::global`] 在首次使用时统一加载。

use crate::activity::Translet;
use crate::convert::TypeKey;
use crate::error::ActionError;
use crate::value::{BeanInstance, Value, ValueType};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 方法实参
pub enum Argument<'a> {
    Translet(&'a dyn Translet),
    Translets(Vec<&'a dyn Translet>),
    Value(Value),
}

impl fmt::Debug for Argument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Translet(t) => write!(f, "Translet({})", t.request_name()),
            Argument::Translets(ts) => write!(f, "Translets(len={})", ts.len()),
            Argument::Value(v) => write!(f, "{:?}", v),
        }
    }
}

/// 从实参中读取的类型
pub trait FromValue: Sized {
    const TYPE_NAME: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_from_value {
    ($($t:ty => $name:literal, |$v:ident| $body:expr;)*) => {
        $(
            impl FromValue for $t {
                const TYPE_NAME: &'static str = $name;

                fn from_value($v: &Value) -> Option<Self> {
                    $body
                }
            }
        )*
    };
}

impl_from_value! {
    String => "String", |v| v.to_text();
    bool => "bool", |v| v.as_bool();
    i32 => "i32", |v| v.as_i32();
    i64 => "i64", |v| v.as_i64();
    f64 => "f64", |v| v.as_f64();
    Value => "Value", |v| Some(v.clone());
    NaiveDate => "Date", |v| match v { Value::Date(d) => Some(*d), _ => None };
    NaiveTime => "Time", |v| match v { Value::Time(t) => Some(*t), _ => None };
    NaiveDateTime => "DateTime", |v| match v { Value::DateTime(d) => Some(*d), _ => None };
    Vec<Value> => "List", |v| v.as_list().map(<[Value]>::to_vec);
    IndexMap<String, Value> => "Map", |v| v.as_map().cloned();
}

impl<T: FromValue> FromValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// 方法实参列表
#[derive(Debug, Default)]
pub struct Arguments<'a> {
    args: Vec<Argument<'a>>,
}

impl<'a> Arguments<'a> {
    pub fn new(args: Vec<Argument<'a>>) -> Self {
        Self { args }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    fn argument(&self, index: usize) -> Result<&Argument<'a>, ActionError> {
        self.args.get(index).ok_or_else(|| {
            ActionError::illegal_argument(format!(
                "Argument index {} out of range; {} argument(s) given",
                index,
                self.args.len()
            ))
        })
    }

    /// 第 `index` 个实参作为请求上下文
    pub fn translet(&self, index: usize) -> Result<&'a dyn Translet, ActionError> {
        match self.argument(index)? {
            Argument::Translet(t) => Ok(*t),
            other => Err(ActionError::illegal_argument(format!(
                "Argument #{} is not a translet: {:?}",
                index, other
            ))),
        }
    }

    /// 没有请求上下文时（例如调度任务）对应位置为 `Null`
    pub fn optional_translet(&self, index: usize) -> Result<Option<&'a dyn Translet>, ActionError> {
        match self.argument(index)? {
            Argument::Value(Value::Null) => Ok(None),
            _ => self.translet(index).map(Some),
        }
    }

    pub fn translets(&self, index: usize) -> Result<&[&'a dyn Translet], ActionError> {
        match self.argument(index)? {
            Argument::Translets(ts) => Ok(ts),
            other => Err(ActionError::illegal_argument(format!(
                "Argument #{} is not a translet array: {:?}",
                index, other
            ))),
        }
    }

    pub fn value(&self, index: usize) -> Result<&Value, ActionError> {
        match self.argument(index)? {
            Argument::Value(v) => Ok(v),
            other => Err(ActionError::illegal_argument(format!(
                "Argument #{} is not a value: {:?}",
                index, other
            ))),
        }
    }

    /// 读取并转换第 `index` 个实参；需要接受 `null` 时使用 `Option<T>`
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T, ActionError> {
        let value = self.value(index)?;
        T::from_value(value).ok_or_else(|| {
            ActionError::illegal_argument(format!(
                "Argument #{} of type {} cannot be read as {}",
                index,
                value.type_name(),
                T::TYPE_NAME
            ))
        })
    }

    /// 取出第 `index` 个实参的值，原位置留下 `Null`
    pub fn take(&mut self, index: usize) -> Result<Value, ActionError> {
        match self.args.get_mut(index) {
            Some(Argument::Value(v)) => Ok(std::mem::take(v)),
            _ => self.value(index).cloned(),
        }
    }
}

/// 方法体
pub type MethodBody =
    Arc<dyn Fn(&dyn Any, Arguments<'_>) -> Result<Value, ActionError> + Send + Sync>;

/// 属性 setter
pub type PropertySetter = Arc<dyn Fn(&dyn Any, Value) -> Result<(), ActionError> + Send + Sync>;

fn method_body<F>(f: F) -> MethodBody
where
    F: Fn(&dyn Any, Arguments<'_>) -> Result<Value, ActionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn property_setter<F>(f: F) -> PropertySetter
where
    F: Fn(&dyn Any, Value) -> Result<(), ActionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn downcast<'t, T: Any>(target: &'t dyn Any, class_name: &str) -> Result<&'t T, ActionError> {
    target.downcast_ref::<T>().ok_or_else(|| {
        ActionError::IllegalState(format!("Target bean is not an instance of {}", class_name))
    })
}

/// 方法描述
pub struct MethodDescriptor {
    class_name: String,
    name: String,
    parameter_types: Vec<ValueType>,
    void: bool,
    body: MethodBody,
}

impl MethodDescriptor {
    pub fn new(
        class_name: impl Into<String>,
        name: impl Into<String>,
        parameter_types: Vec<ValueType>,
        void: bool,
        body: MethodBody,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            name: name.into(),
            parameter_types,
            void,
            body,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[ValueType] {
        &self.parameter_types
    }

    /// 声明的返回类型为"无值"
    pub fn is_void(&self) -> bool {
        self.void
    }

    /// 第一个参数是否为请求上下文
    pub fn requires_translet(&self) -> bool {
        self.parameter_types.first() == Some(&ValueType::Translet)
    }

    /// 实参类型与形参的总匹配代价；参数个数不同或任一参数不可赋值时为 `None`
    pub fn match_weight(&self, arg_types: &[ValueType]) -> Option<u32> {
        if arg_types.len() != self.parameter_types.len() {
            return None;
        }
        self.parameter_types
            .iter()
            .zip(arg_types)
            .map(|(param, arg)| param.assignable_weight(*arg))
            .sum()
    }

    /// 调用方法
    pub fn invoke(&self, target: &dyn Any, args: Arguments<'_>) -> Result<Value, ActionError> {
        if args.len() != self.parameter_types.len() {
            return Err(ActionError::illegal_argument(format!(
                "Wrong number of arguments for {}: expected {}, given {}",
                self,
                self.parameter_types.len(),
                args.len()
            )));
        }
        (self.body)(target, args)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<_> = self.parameter_types.iter().map(ValueType::name).collect();
        write!(f, "{}.{}({})", self.class_name, self.name, params.join(", "))
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodDescriptor({})", self)
    }
}

/// 可写属性描述
pub struct PropertyDescriptor {
    name: String,
    value_type: ValueType,
    setter: PropertySetter,
}

impl PropertyDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn set(&self, target: &dyn Any, value: Value) -> Result<(), ActionError> {
        (self.setter)(target, value)
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyDescriptor({}: {})", self.name, self.value_type)
    }
}

/// 类描述
pub struct ClassDescriptor {
    name: String,
    type_id: TypeId,
    component: bool,
    methods: Vec<Arc<MethodDescriptor>>,
    properties: IndexMap<String, Arc<PropertyDescriptor>>,
}

impl ClassDescriptor {
    pub fn builder<T: Any + Send + Sync>(name: impl Into<String>) -> ClassDescriptorBuilder<T> {
        ClassDescriptorBuilder {
            descriptor: ClassDescriptor {
                name: name.into(),
                type_id: TypeId::of::<T>(),
                component: false,
                methods: Vec::new(),
                properties: IndexMap::new(),
            },
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 可以作为注解方法参数按类型注入
    pub fn is_component(&self) -> bool {
        self.component
    }

    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    pub fn property(&self, name: &str) -> Option<&Arc<PropertyDescriptor>> {
        self.properties.get(name)
    }

    /// 按名称和形参类型精确查找
    pub fn method(&self, name: &str, parameter_types: &[ValueType]) -> Option<Arc<MethodDescriptor>> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.parameter_types == parameter_types)
            .cloned()
    }

    /// 查找与实参类型最接近的可访问方法
    ///
    /// 优先精确匹配，否则选总代价最小的重载；代价相同时保留先声明的方法。
    pub fn find_matching_method(
        &self,
        name: &str,
        arg_types: &[ValueType],
    ) -> Option<Arc<MethodDescriptor>> {
        if let Some(exact) = self.method(name, arg_types) {
            return Some(exact);
        }
        let mut best: Option<(u32, &Arc<MethodDescriptor>)> = None;
        for method in self.methods.iter().filter(|m| m.name == name) {
            if let Some(weight) = method.match_weight(arg_types) {
                if best.map_or(true, |(w, _)| weight < w) {
                    best = Some((weight, method));
                }
            }
        }
        best.map(|(_, m)| Arc::clone(m))
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("component", &self.component)
            .field("methods", &self.methods)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// [`ClassDescriptor`] 构建器
pub struct ClassDescriptorBuilder<T> {
    descriptor: ClassDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> ClassDescriptorBuilder<T> {
    /// 标记为组件
    pub fn component(mut self) -> Self {
        self.descriptor.component = true;
        self
    }

    fn push(&mut self, name: &str, params: &[ValueType], void: bool, body: MethodBody) {
        self.descriptor.methods.push(Arc::new(MethodDescriptor::new(
            self.descriptor.name.clone(),
            name,
            params.to_vec(),
            void,
            body,
        )));
    }

    /// 有返回值的实例方法
    pub fn method<F>(mut self, name: &str, params: &[ValueType], f: F) -> Self
    where
        F: Fn(&T, Arguments<'_>) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        let class_name = self.descriptor.name.clone();
        let body = method_body(move |target, args| f(downcast::<T>(target, &class_name)?, args));
        self.push(name, params, false, body);
        self
    }

    /// 无返回值的实例方法
    pub fn void_method<F>(mut self, name: &str, params: &[ValueType], f: F) -> Self
    where
        F: Fn(&T, Arguments<'_>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        let class_name = self.descriptor.name.clone();
        let body = method_body(move |target, args| {
            f(downcast::<T>(target, &class_name)?, args).map(|_| Value::Null)
        });
        self.push(name, params, true, body);
        self
    }

    /// 静态方法，调用时忽略目标对象
    pub fn static_method<F>(mut self, name: &str, params: &[ValueType], f: F) -> Self
    where
        F: Fn(Arguments<'_>) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        let body = method_body(move |_, args| f(args));
        self.push(name, params, false, body);
        self
    }

    /// 可写属性
    ///
    /// Bean 是共享的，setter 通过内部可变性修改状态。
    pub fn property<F>(mut self, name: &str, value_type: ValueType, f: F) -> Self
    where
        F: Fn(&T, Value) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        let class_name = self.descriptor.name.clone();
        let setter = property_setter(move |target, value| {
            f(downcast::<T>(target, &class_name)?, value)
        });
        self.descriptor.properties.insert(
            name.to_string(),
            Arc::new(PropertyDescriptor {
                name: name.to_string(),
                value_type,
                setter,
            }),
        );
        self
    }

    pub fn build(self) -> ClassDescriptor {
        self.descriptor
    }
}

/// 模型属性
#[derive(Debug, Clone)]
pub struct ModelProperty {
    pub name: String,
    pub type_key: TypeKey,
    pub array: bool,
    /// 请求参数名；为空时使用属性名
    pub qualifier: Option<String>,
    pub format: Option<String>,
    pub required: bool,
}

impl ModelProperty {
    pub fn new(name: impl Into<String>, type_key: TypeKey) -> Self {
        Self {
            name: name.into(),
            type_key,
            array: false,
            qualifier: None,
            format: None,
            required: false,
        }
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// 绑定时查找的请求参数名
    pub fn parameter_name(&self) -> &str {
        self.qualifier.as_deref().unwrap_or(&self.name)
    }
}

type ModelFactory =
    Arc<dyn Fn(IndexMap<String, Value>) -> Result<Value, ActionError> + Send + Sync>;

/// 从请求参数绑定的结构化类型
pub struct ModelDescriptor {
    type_name: String,
    properties: Vec<ModelProperty>,
    factory: ModelFactory,
}

impl ModelDescriptor {
    /// `factory` 接收已转换的属性值（未绑定的属性不出现在映射中）
    pub fn new<F>(type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(IndexMap<String, Value>) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            properties: Vec::new(),
            factory: Arc::new(factory),
        }
    }

    pub fn property(mut self, property: ModelProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn properties(&self) -> &[ModelProperty] {
        &self.properties
    }

    pub fn instantiate(&self, values: IndexMap<String, Value>) -> Result<Value, ActionError> {
        (self.factory)(values)
    }
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("type_name", &self.type_name)
            .field("properties", &self.properties)
            .finish()
    }
}

/// 按名称查找方法与属性
///
/// 默认实现为 [`ClassRegistry`]。返回的描述符在锁外调用。
pub trait MethodResolver: Send + Sync {
    /// 在 Bean 的运行期类型上查找与实参类型最接近的方法；找不到时返回
    /// [`ActionError::MethodNotFound`]
    fn find_method(
        &self,
        bean: &BeanInstance,
        name: &str,
        arg_types: &[ValueType],
    ) -> Result<Arc<MethodDescriptor>, ActionError>;

    /// 查找可写属性；找不到时返回 [`ActionError::PropertyNotFound`]
    fn find_property(
        &self,
        bean: &BeanInstance,
        name: &str,
    ) -> Result<Arc<PropertyDescriptor>, ActionError>;
}

/// 编译期提交的类描述
pub struct ClassRegistration {
    pub describe: fn() -> ClassDescriptor,
}

inventory::collect!(ClassRegistration);

/// 编译期提交的模型描述
pub struct ModelRegistration {
    pub describe: fn() -> ModelDescriptor,
}

inventory::collect!(ModelRegistration);

/// 提交一个返回 [`ClassDescriptor`] 的函数
#[macro_export]
macro_rules! submit_class {
    ($describe:path) => {
        $crate::inventory::submit! {
            $crate::reflect::ClassRegistration { describe: $describe }
        }
    };
}

/// 提交一个返回 [`ModelDescriptor`] 的函数
#[macro_export]
macro_rules! submit_model {
    ($describe:path) => {
        $crate::inventory::submit! {
            $crate::reflect::ModelRegistration { describe: $describe }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    type_id: TypeId,
    name: String,
    arg_types: Vec<ValueType>,
}

static GLOBAL_REGISTRY: Lazy<Arc<ClassRegistry>> =
    Lazy::new(|| Arc::new(ClassRegistry::from_registrations()));

/// 类注册表
///
/// 只缓存命中的方法查找；锁只在查找期间持有，从不跨越方法调用。
#[derive(Default)]
pub struct ClassRegistry {
    classes: RwLock<HashMap<TypeId, Arc<ClassDescriptor>>>,
    names: RwLock<HashMap<String, TypeId>>,
    models: RwLock<HashMap<String, Arc<ModelDescriptor>>>,
    method_cache: RwLock<HashMap<MethodKey, Arc<MethodDescriptor>>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加载所有通过 `submit_class!` / `submit_model!` 提交的描述
    pub fn from_registrations() -> Self {
        let registry = Self::new();
        let mut classes = 0;
        for registration in inventory::iter::<ClassRegistration> {
            registry.register((registration.describe)());
            classes += 1;
        }
        let mut models = 0;
        for registration in inventory::iter::<ModelRegistration> {
            registry.register_model((registration.describe)());
            models += 1;
        }
        tracing::info!("Loaded {} class descriptor(s) and {} model descriptor(s)", classes, models);
        registry
    }

    /// 全局注册表，首次访问时加载
    pub fn global() -> Arc<ClassRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// 注册类描述；同一类型重复注册时替换旧描述
    pub fn register(&self, descriptor: ClassDescriptor) -> Arc<ClassDescriptor> {
        let descriptor = Arc::new(descriptor);
        let type_id = descriptor.type_id;
        tracing::debug!("Registering class descriptor '{}'", descriptor.name);
        self.names.write().insert(descriptor.name.clone(), type_id);
        self.classes.write().insert(type_id, Arc::clone(&descriptor));
        self.method_cache.write().retain(|key, _| key.type_id != type_id);
        descriptor
    }

    pub fn register_model(&self, model: ModelDescriptor) {
        tracing::debug!("Registering model descriptor '{}'", model.type_name);
        self.models
            .write()
            .insert(model.type_name.clone(), Arc::new(model));
    }

    pub fn get(&self, type_id: TypeId) -> Option<Arc<ClassDescriptor>> {
        self.classes.read().get(&type_id).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        let type_id = *self.names.read().get(name)?;
        self.get(type_id)
    }

    /// Bean 实例的类描述
    pub fn class_of(&self, bean: &BeanInstance) -> Option<Arc<ClassDescriptor>> {
        self.get(Any::type_id(&**bean))
    }

    pub fn model(&self, type_name: &str) -> Option<Arc<ModelDescriptor>> {
        self.models.read().get(type_name).cloned()
    }

    pub fn is_component(&self, name: &str) -> bool {
        self.get_by_name(name).map_or(false, |c| c.is_component())
    }

    fn class_name_of(&self, bean: &BeanInstance) -> String {
        self.class_of(bean)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "<unregistered>".to_string())
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.names.read().keys().collect::<Vec<_>>())
            .field("models", &self.models.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MethodResolver for ClassRegistry {
    fn find_method(
        &self,
        bean: &BeanInstance,
        name: &str,
        arg_types: &[ValueType],
    ) -> Result<Arc<MethodDescriptor>, ActionError> {
        let key = MethodKey {
            type_id: Any::type_id(&**bean),
            name: name.to_string(),
            arg_types: arg_types.to_vec(),
        };
        if let Some(method) = self.method_cache.read().get(&key) {
            return Ok(Arc::clone(method));
        }

        let method = self
            .get(key.type_id)
            .and_then(|class| class.find_matching_method(name, arg_types))
            .ok_or_else(|| ActionError::MethodNotFound {
                class: self.class_name_of(bean),
                method: name.to_string(),
                arg_types: arg_types.iter().map(|t| t.name().to_string()).collect(),
            })?;

        self.method_cache.write().insert(key, Arc::clone(&method));
        Ok(method)
    }

    fn find_property(
        &self,
        bean: &BeanInstance,
        name: &str,
    ) -> Result<Arc<PropertyDescriptor>, ActionError> {
        self.class_of(bean)
            .and_then(|class| class.property(name).cloned())
            .ok_or_else(|| ActionError::PropertyNotFound {
                class: self.class_name_of(bean),
                property: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Counter {
        total: Mutex<i64>,
        label: Mutex<String>,
    }

    fn describe_counter() -> ClassDescriptor {
        ClassDescriptor::builder::<Counter>("Counter")
            .method("add", &[ValueType::Long], |c: &Counter, args| {
                let n: i64 = args.get(0)?;
                let mut total = c.total.lock();
                *total += n;
                Ok(Value::Long(*total))
            })
            .method("add", &[ValueType::Double], |_: &Counter, args| {
                let n: f64 = args.get(0)?;
                Ok(Value::Double(n))
            })
            .method("add", &[ValueType::Any], |_: &Counter, _| Ok(Value::from("any")))
            .void_method("reset", &[], |c: &Counter, _| {
                *c.total.lock() = 0;
                Ok(())
            })
            .property("label", ValueType::String, |c: &Counter, v| {
                *c.label.lock() = v.to_text().unwrap_or_default();
                Ok(())
            })
            .build()
    }

    #[test]
    fn test_closest_match_prefers_least_widening() {
        let class = describe_counter();
        let m = class.find_matching_method("add", &[ValueType::Int]).unwrap();
        assert_eq!(m.parameter_types(), &[ValueType::Long]);
        let m = class.find_matching_method("add", &[ValueType::Float]).unwrap();
        assert_eq!(m.parameter_types(), &[ValueType::Double]);
        let m = class.find_matching_method("add", &[ValueType::String]).unwrap();
        assert_eq!(m.parameter_types(), &[ValueType::Any]);
        assert!(class.find_matching_method("add", &[]).is_none());
    }

    #[test]
    fn test_null_argument_skips_primitive_overloads() {
        let class = ClassDescriptor::builder::<Counter>("Counter")
            .method("add", &[ValueType::Long], |_: &Counter, _| Ok(Value::Null))
            .method("label", &[ValueType::String], |_: &Counter, _| Ok(Value::Null))
            .build();
        assert!(class.find_matching_method("add", &[ValueType::Any]).is_none());
        assert!(class.find_matching_method("label", &[ValueType::Any]).is_some());
    }

    #[test]
    fn test_registry_lookup_and_invoke() {
        let registry = ClassRegistry::new();
        registry.register(describe_counter());
        let bean: BeanInstance = Arc::new(Counter::default());

        let method = registry.find_method(&bean, "add", &[ValueType::Int]).unwrap();
        let result = method
            .invoke(bean.as_ref(), Arguments::new(vec![Argument::Value(Value::Int(5))]))
            .unwrap();
        assert_eq!(result, Value::Long(5));

        let reset = registry.find_method(&bean, "reset", &[]).unwrap();
        assert!(reset.is_void());

        let property = registry.find_property(&bean, "label").unwrap();
        property.set(bean.as_ref(), Value::from("main")).unwrap();
        let counter = bean.downcast_ref::<Counter>().unwrap();
        assert_eq!(*counter.label.lock(), "main");
    }

    #[test]
    fn test_missing_method_is_distinct_error() {
        let registry = ClassRegistry::new();
        registry.register(describe_counter());
        let bean: BeanInstance = Arc::new(Counter::default());
        let err = registry.find_method(&bean, "remove", &[ValueType::Int]).unwrap_err();
        assert!(err.is_method_not_found());
        assert_eq!(err.to_string(), "No such accessible method Counter.remove(i32)");

        let err = registry.find_property(&bean, "missing").unwrap_err();
        assert!(matches!(err, ActionError::PropertyNotFound { .. }));
    }

    #[test]
    fn test_wrong_target_type() {
        let class = describe_counter();
        let method = class.method("reset", &[]).unwrap();
        let err = method.invoke(&"not a counter", Arguments::default()).unwrap_err();
        assert!(matches!(err, ActionError::IllegalState(_)));
    }

    #[test]
    fn test_argument_access() {
        let args = Arguments::new(vec![
            Argument::Value(Value::from("7")),
            Argument::Value(Value::Null),
        ]);
        assert_eq!(args.get::<i32>(0).unwrap(), 7);
        assert_eq!(args.get::<Option<String>>(1).unwrap(), None);
        assert!(args.get::<String>(1).is_err());
        assert!(args.translet(0).is_err());
        assert!(args.value(2).is_err());
    }
}
