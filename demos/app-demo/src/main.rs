use aspectran_core::prelude::*;
use aspectran_core::{ClassRegistry, EnvironmentPropertySource, TomlPropertySource};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

const APPLICATION_TOML: &str = include_str!("../config/application.toml");

/// 订单不存在
static ORDER_NOT_FOUND: ExceptionType =
    ExceptionType::new("demo.OrderNotFoundException", Some(&types::RUNTIME_EXCEPTION));

// ==================== 业务模型 ====================

#[derive(Debug, Clone)]
struct OrderRecord {
    id: i64,
    item: String,
    qty: i32,
}

impl OrderRecord {
    fn to_value(&self) -> Value {
        Value::Map(
            [
                ("id".to_string(), Value::Long(self.id)),
                ("item".to_string(), Value::from(self.item.as_str())),
                ("qty".to_string(), Value::Int(self.qty)),
            ]
            .into_iter()
            .collect(),
        )
    }
}

/// 下单请求 - 由请求参数绑定
#[derive(Debug)]
struct NewOrder {
    item: String,
    qty: Option<i32>,
}

fn describe_new_order() -> ModelDescriptor {
    ModelDescriptor::new("NewOrder", |values| {
        Ok(Value::object(NewOrder {
            item: values.get("item").and_then(Value::to_text).unwrap_or_default(),
            qty: values.get("qty").and_then(Value::as_i32),
        }))
    })
    .property(ModelProperty::new("item", TypeKey::STRING).required())
    .property(ModelProperty::new("qty", TypeKey::INT))
}

aspectran_core::submit_model!(describe_new_order);

// ==================== 业务服务 ====================

/// 订单服务
#[derive(Debug)]
struct OrderService {
    next_id: AtomicI64,
    orders: Mutex<Vec<OrderRecord>>,
}

impl Default for OrderService {
    fn default() -> Self {
        let seed = vec![
            OrderRecord { id: 1, item: "keyboard".to_string(), qty: 1 },
            OrderRecord { id: 2, item: "monitor".to_string(), qty: 2 },
        ];
        Self {
            next_id: AtomicI64::new(seed.len() as i64 + 1),
            orders: Mutex::new(seed),
        }
    }
}

impl OrderService {
    fn orders(&self) -> Result<std::sync::MutexGuard<'_, Vec<OrderRecord>>> {
        self.orders
            .lock()
            .map_err(|_| ActionError::IllegalState("Order store is poisoned".to_string()))
    }

    fn find(&self, id: i64) -> Result<OrderRecord> {
        self.orders()?
            .iter()
            .find(|order| order.id == id)
            .cloned()
            .ok_or_else(|| Exception::new(&ORDER_NOT_FOUND, format!("No order with id {}", id)).into())
    }

    fn place(&self, order: &NewOrder) -> Result<OrderRecord> {
        let record = OrderRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            item: order.item.clone(),
            qty: order.qty.unwrap_or(1),
        };
        self.orders()?.push(record.clone());
        tracing::info!("Placed order #{} ({} x{})", record.id, record.item, record.qty);
        Ok(record)
    }
}

fn describe_order_service() -> ClassDescriptor {
    ClassDescriptor::builder::<OrderService>("demo.OrderService")
        .component()
        .method("find", &[ValueType::Translet, ValueType::Long], |service, args| {
            let translet = args.translet(0)?;
            let id: i64 = args.get(1)?;
            tracing::debug!("Looking up order {} for '{}'", id, translet.request_name());
            let order = service.find(id)?;
            translet.set_attribute("order", order.to_value());
            Ok(order.to_value())
        })
        .method("place", &[ValueType::Object], |service, args| {
            let order = args
                .value(0)?
                .downcast_ref::<NewOrder>()
                .ok_or_else(|| ActionError::illegal_argument("Expected a NewOrder argument"))?;
            service.place(order).map(|record| record.to_value())
        })
        .method("count", &[], |service, _| Ok(Value::Int(service.orders()?.len() as i32)))
        .build()
}

aspectran_core::submit_class!(describe_order_service);

/// 审计日志 - 作为切面的通知 Bean
#[derive(Debug, Default)]
struct AuditLog {
    entries: Mutex<Vec<String>>,
}

impl AuditLog {
    fn record(&self, entry: String) -> Result<()> {
        tracing::info!(target: "audit", "{}", entry);
        self.entries
            .lock()
            .map_err(|_| ActionError::IllegalState("Audit log is poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}

fn describe_audit_log() -> ClassDescriptor {
    ClassDescriptor::builder::<AuditLog>("demo.AuditLog")
        .void_method("record", &[ValueType::String], |audit, args| audit.record(args.get(0)?))
        .method("entries", &[], |audit, _| {
            let entries = audit
                .entries
                .lock()
                .map_err(|_| ActionError::IllegalState("Audit log is poisoned".to_string()))?;
            Ok(Value::List(entries.iter().map(|e| Value::from(e.as_str())).collect()))
        })
        .build()
}

aspectran_core::submit_class!(describe_audit_log);

// ==================== 配置定义 ====================

fn property_sources() -> anyhow::Result<Vec<Box<dyn PropertySource>>> {
    Ok(vec![
        Box::new(TomlPropertySource::parse(APPLICATION_TOML, "application.toml")?),
        // APP_ASPECTRAN_LOGGING_LEVEL=debug -> aspectran.logging.level
        Box::new(EnvironmentPropertySource::new("APP_")),
    ])
}

fn init_logging() -> anyhow::Result<()> {
    let environment = Environment::new();
    for source in property_sources()? {
        environment.add_property_source(source);
    }
    LoggingConfig::from_environment(&environment)?.init()?;
    Ok(())
}

fn long_item(name: &str, text: &str) -> ItemRule {
    let mut item = ItemRule::single(name, text);
    item.set_value_type(ItemValueType::Long);
    item
}

// ==================== 切面与 translet ====================

fn audit_aspect() -> anyhow::Result<Arc<AspectRule>> {
    let record = |text: &str| {
        InvokeActionRule::method_name("record")
            .with_argument(ItemRule::single("entry", text))
            .with_hidden(true)
    };
    let aspect = AspectRule::builder("auditAspect")
        .order(1)
        .advice_bean_id("auditLog")
        .description("Records every order request")
        .before(record("begin ${id:-}"))?
        .after(record("done ${id:-}"))?
        .finally(record("closed"))?
        .thrown_with(
            ExceptionThrownRule::new()
                .with_type(ORDER_NOT_FOUND.name())
                .with_response(ResponseRule::new().with_content_type("application/json").with_status(404)),
            record("missing order ${id}"),
        )?
        .build();
    Ok(aspect)
}

fn translets(classes: &ClassRegistry, audit: &Arc<AspectRule>) -> anyhow::Result<Vec<TransletRule>> {
    let service = classes
        .get_by_name("demo.OrderService")
        .ok_or_else(|| anyhow::anyhow!("OrderService is not registered"))?;
    let place = service
        .method("place", &[ValueType::Object])
        .ok_or_else(|| anyhow::anyhow!("OrderService.place is not registered"))?;

    let view = TransletRule::new("order/view")
        .with_description("Shows a single order")
        .with_aspect(Arc::clone(audit))
        .with_content(
            ActionList::named("view")
                .with(
                    InvokeActionRule::method_name("find")
                        .with_bean_id("orderService")
                        .with_action_id("order")
                        .with_argument(long_item("id", "${id}")),
                )
                .with(
                    EchoActionRule::new()
                        .with_action_id("viewer")
                        .with_item(ItemRule::single("user", "${user:guest}"))
                        .with_item(ItemRule::single("app", "%{app.name} %{app.version}")),
                )
                .with(HeaderActionRule::new().with_header(ItemRule::single("X-Order-Id", "${id}"))),
        );

    let place = TransletRule::new("order/place")
        .with_method(MethodType::Post)
        .with_aspect(Arc::clone(audit))
        .with_content(
            ActionList::named("place").with(
                AnnotatedActionRule::new("demo.OrderService", place)
                    .with_action_id("placed")
                    .with_parameter(ParameterBindingRule::new(
                        "order",
                        ParameterType::value(TypeKey::new("NewOrder")),
                    )),
            ),
        )
        .with_exception_rule(ExceptionRule::new().with_thrown(
            ExceptionThrownRule::new()
                .with_type(types::ILLEGAL_ARGUMENT.name())
                .with_action(
                    EchoActionRule::new()
                        .with_action_id("rejected")
                        .with_item(ItemRule::single("reason", "item is required")),
                )
                .with_response(ResponseRule::new().with_status(400)),
        ));

    let summary = TransletRule::new("order/summary").with_content(
        ActionList::named("summary")
            .with(
                ChooseRule::new()
                    .with_when(
                        ChooseWhenRule::when("${detail} == 'full'").with_action(
                            IncludeActionRule::new("order/view")
                                .with_action_id("detail")
                                .with_parameter(ItemRule::single("id", "${id}")),
                        ),
                    )
                    .with_when(
                        ChooseWhenRule::otherwise().with_action(
                            InvokeActionRule::method_name("count")
                                .with_bean_id("orderService")
                                .with_action_id("count"),
                        ),
                    ),
            ),
    );

    Ok(vec![view, place, summary])
}

// ==================== 应用入口 ====================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    println!("╔════════════════════════════════════════════════════╗");
    println!("║        Aspectran Action Engine - Order Desk        ║");
    println!("╚════════════════════════════════════════════════════╝\n");

    let audit = audit_aspect()?;
    let classes = ClassRegistry::global();
    let mut builder = ActivityContext::builder()
        .class_registry(Arc::clone(&classes))
        .bean(BeanRule::of("demo.OrderService", OrderService::default).with_lazy(false))?
        .bean(BeanRule::of("demo.AuditLog", AuditLog::default).with_id("auditLog"))?;
    for source in property_sources()? {
        builder = builder.add_property_source(source);
    }
    for translet in translets(&classes, &audit)? {
        builder = builder.translet(translet)?;
    }
    let context = builder.build()?;

    println!(
        "🚀 {} v{} started with {} translet(s)\n",
        context.environment().get_string_or("app.name", "app"),
        context.environment().get_string_or("app.version", "0.0.0"),
        context.translets().len()
    );

    // ==================== 单个请求 ====================

    let response = context.perform(
        TransletRequest::new("order/view")
            .with_parameter("id", "1")
            .with_parameter("user", "kim"),
    )?;
    println!("📦 order/view    -> {}", response.process_result.to_json()?);
    println!("   X-Order-Id    = {:?}", response.headers.get("X-Order-Id"));

    let response = context.perform(
        TransletRequest::new("order/place")
            .with_method(MethodType::Post)
            .with_parameter("item", "mouse")
            .with_parameter("qty", "3"),
    )?;
    println!("🛒 order/place   -> {}", response.process_result.to_json()?);

    let response = context.perform(
        TransletRequest::new("order/place")
            .with_method(MethodType::Post)
            .with_parameter("qty", "3"),
    )?;
    if let Some(handled) = &response.handled {
        println!("⚠️  order/place   -> handled {} ({})", handled.rule, handled.error);
    }

    let response = context.perform(TransletRequest::new("order/view").with_parameter("id", "42"))?;
    if let Some(handled) = &response.handled {
        let status = handled
            .rule
            .response(Some("application/json"))
            .and_then(ResponseRule::status);
        println!("❌ order/view    -> status {:?}: {}", status, handled.error);
    }

    // ==================== 条件与嵌套 ====================

    for detail in ["full", "brief"] {
        let response = context.perform(
            TransletRequest::new("order/summary")
                .with_parameter("detail", detail)
                .with_parameter("id", "2"),
        )?;
        println!("🔀 order/summary ({}) -> {}", detail, response.process_result.to_json()?);
    }

    // ==================== 并发请求 ====================

    println!("\n⚡ Placing orders concurrently...");
    let mut handles = Vec::new();
    for i in 0..4 {
        let context = Arc::clone(&context);
        handles.push(tokio::task::spawn_blocking(move || {
            context.perform(
                TransletRequest::new("order/place")
                    .with_method(MethodType::Post)
                    .with_parameter("item", format!("cable-{}", i).as_str())
                    .with_parameter("qty", "1"),
            )
        }));
    }
    for handle in handles {
        let response = handle.await??;
        println!("   {}", response.process_result.to_json()?);
    }

    let audit_entries = context
        .new_activity()
        .get_bean("auditLog")?
        .downcast_ref::<AuditLog>()
        .and_then(|audit| audit.entries.lock().ok().map(|entries| entries.len()))
        .unwrap_or_default();

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║                Key Features                        ║");
    println!("╚════════════════════════════════════════════════════╝\n");
    println!("✅ 共享的无状态动作，多请求并发执行");
    println!("✅ before / after / finally 通知按切面顺序执行");
    println!("✅ 注解方法参数绑定（模型、类型转换）");
    println!("✅ 按异常类型距离选择处理规则");
    println!("✅ choose / include 条件与嵌套 translet");
    println!("📝 Audit entries recorded: {}", audit_entries);

    println!("\n💡 Try these commands:");
    println!("   APP_ASPECTRAN_LOGGING_LEVEL=debug cargo run -p app-demo");
    println!();

    Ok(())
}
