//! 通知执行与异常分派
//!
//! [`AspectAdviceRuleRegistry`] 保存附着到一个 translet 上的切面，按阶段排好通知的顺序：
//!
//! - before：`order` 升序，相同 `order` 保持注册顺序
//! - after、finally：`order` 降序，相同 `order` 时后注册的先执行
//! - around：同时进入 before 与 after
//! - 异常处理：后注册的切面先处理
//!
//! 通知 Bean 与通知结果记录在每个请求自己的 [`AspectAdviceResult`] 中。

use crate::action::{Action, Executable, Outcome};
use crate::activity::Activity;
use crate::error::{ActionError, Result};
use crate::rule::aspect::{AdviceType, AspectAdviceRule, AspectRule};
use crate::rule::exception::{ExceptionRule, ExceptionThrownRule};
use crate::value::{BeanInstance, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// 一次请求中按切面记录的通知 Bean 与通知结果
#[derive(Default)]
pub struct AspectAdviceResult {
    beans: Mutex<HashMap<String, BeanInstance>>,
    results: Mutex<HashMap<(String, AdviceType), Value>>,
}

impl AspectAdviceResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录切面的通知 Bean；已经记录过时保留原值
    pub fn put_aspect_advice_bean(&self, aspect_id: &str, bean: BeanInstance) {
        self.beans.lock().entry(aspect_id.to_string()).or_insert(bean);
    }

    pub fn aspect_advice_bean(&self, aspect_id: &str) -> Option<BeanInstance> {
        self.beans.lock().get(aspect_id).cloned()
    }

    pub fn put_advice_result(&self, aspect_id: &str, advice_type: AdviceType, value: Value) {
        self.results
            .lock()
            .insert((aspect_id.to_string(), advice_type), value);
    }

    pub fn advice_result(&self, aspect_id: &str, advice_type: AdviceType) -> Option<Value> {
        self.results
            .lock()
            .get(&(aspect_id.to_string(), advice_type))
            .cloned()
    }
}

impl std::fmt::Debug for AspectAdviceResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AspectAdviceResult")
            .field("beans", &self.beans.lock().keys().collect::<Vec<_>>())
            .field("results", &self.results.lock().len())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct AdviceEntry {
    aspect: Arc<AspectRule>,
    advice: Arc<AspectAdviceRule>,
}

/// 附着到一个 translet 上的切面通知
#[derive(Debug, Default, Clone)]
pub struct AspectAdviceRuleRegistry {
    aspects: Vec<Arc<AspectRule>>,
    before: Vec<AdviceEntry>,
    after: Vec<AdviceEntry>,
    finally: Vec<AdviceEntry>,
    exception_aspects: Vec<Arc<AspectRule>>,
}

impl AspectAdviceRuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, aspect: Arc<AspectRule>) -> Self {
        self.add_aspect_rule(aspect);
        self
    }

    pub fn add_aspect_rule(&mut self, aspect: Arc<AspectRule>) {
        tracing::debug!(aspect = aspect.id(), "Registering aspect {}", aspect);
        for advice in aspect.advice_rules() {
            let entry = AdviceEntry {
                aspect: Arc::clone(&aspect),
                advice: Arc::clone(advice),
            };
            match advice.advice_type() {
                AdviceType::Before => insert_ascending(&mut self.before, entry),
                AdviceType::After => insert_descending(&mut self.after, entry),
                AdviceType::Around => {
                    insert_ascending(&mut self.before, entry.clone());
                    insert_descending(&mut self.after, entry);
                }
                AdviceType::Finally => insert_descending(&mut self.finally, entry),
                AdviceType::Thrown => {}
            }
        }
        if aspect.exception_rule().is_some() {
            self.exception_aspects.insert(0, Arc::clone(&aspect));
        }
        self.aspects.push(aspect);
    }

    pub fn aspect_rule_count(&self) -> usize {
        self.aspects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aspects.is_empty()
    }

    pub fn before_advice_rules(&self) -> Vec<&Arc<AspectAdviceRule>> {
        self.before.iter().map(|e| &e.advice).collect()
    }

    pub fn after_advice_rules(&self) -> Vec<&Arc<AspectAdviceRule>> {
        self.after.iter().map(|e| &e.advice).collect()
    }

    pub fn finally_advice_rules(&self) -> Vec<&Arc<AspectAdviceRule>> {
        self.finally.iter().map(|e| &e.advice).collect()
    }

    /// 有异常处理规则的切面，按处理顺序
    pub fn exception_aspects(&self) -> &[Arc<AspectRule>] {
        &self.exception_aspects
    }

    /// 在通知之间执行 `body`
    ///
    /// before、`body`、after 依次执行，任一失败即停止；finally 通知总是全部执行，
    /// 其中的失败只记录日志，但第一个非隔离的失败会在其余阶段成功时作为结果返回。
    pub fn run<T>(&self, activity: &dyn Activity, body: impl FnOnce() -> Result<T>) -> Result<T> {
        let result = self
            .execute_advice_list(&self.before, activity)
            .and_then(|_| body())
            .and_then(|value| {
                self.execute_advice_list(&self.after, activity)?;
                Ok(value)
            });
        let finally = self.execute_finally(activity);
        match (result, finally) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), _) => Err(e),
        }
    }

    fn execute_advice_list(&self, entries: &[AdviceEntry], activity: &dyn Activity) -> Result<()> {
        for entry in entries {
            if let Err(e) = execute_advice(activity, &entry.aspect, &entry.advice) {
                if entry.aspect.is_isolated() {
                    tracing::error!(
                        aspect = entry.aspect.id(),
                        "Failed to execute an isolated advice action {}; Cause: {}",
                        entry.advice,
                        e
                    );
                } else {
                    return Err(ActionError::execution(&*entry.advice, e));
                }
            }
        }
        Ok(())
    }

    fn execute_finally(&self, activity: &dyn Activity) -> Result<()> {
        let mut first_error = None;
        for entry in &self.finally {
            if let Err(e) = execute_advice(activity, &entry.aspect, &entry.advice) {
                if entry.aspect.is_isolated() {
                    tracing::error!(
                        aspect = entry.aspect.id(),
                        "Failed to execute an isolated advice action {}; Cause: {}",
                        entry.advice,
                        e
                    );
                } else {
                    tracing::error!(
                        aspect = entry.aspect.id(),
                        "Failed to execute an advice action {}; Cause: {}",
                        entry.advice,
                        e
                    );
                    first_error.get_or_insert(ActionError::execution(&*entry.advice, e));
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// 依次交给每个切面的异常处理规则
    ///
    /// 每个命中的规则都执行它的动作；返回第一个命中的规则。
    pub fn handle_exception(
        &self,
        activity: &dyn Activity,
        error: &ActionError,
    ) -> Result<Option<Arc<ExceptionThrownRule>>> {
        let mut handled = None;
        for aspect in &self.exception_aspects {
            if aspect.is_disabled() {
                continue;
            }
            let Some(exception_rule) = aspect.exception_rule() else {
                continue;
            };
            let matched = match handle_with(activity, exception_rule, error, Some(aspect)) {
                Ok(matched) => matched,
                Err(e) if aspect.is_isolated() => {
                    tracing::error!(
                        aspect = aspect.id(),
                        "Failed to execute an isolated exception handler; Cause: {}",
                        e
                    );
                    None
                }
                Err(e) => return Err(e),
            };
            if handled.is_none() {
                handled = matched;
            }
        }
        Ok(handled)
    }
}

/// 以一个异常处理规则处理失败；没有命中的规则时返回 `None`
pub fn handle_exception(
    activity: &dyn Activity,
    exception_rule: &ExceptionRule,
    error: &ActionError,
) -> Result<Option<Arc<ExceptionThrownRule>>> {
    handle_with(activity, exception_rule, error, None)
}

fn handle_with(
    activity: &dyn Activity,
    exception_rule: &ExceptionRule,
    error: &ActionError,
    aspect: Option<&AspectRule>,
) -> Result<Option<Arc<ExceptionThrownRule>>> {
    tracing::debug!("Exception handling for raised exception: {}", error.root_cause());
    let Some(thrown_rule) = exception_rule.get_exception_thrown_rule(error) else {
        return Ok(None);
    };
    if let Some(action) = thrown_rule.action() {
        let outcome = aspect
            .map_or(Ok(()), |aspect| prepare_advice_bean(activity, aspect, action))
            .and_then(|_| action.execute(activity))
            .map_err(|e| ActionError::execution(format!("advice action {}", action), e))?;
        if let (Some(aspect), Some(value)) = (aspect, outcome.into_value()) {
            activity
                .aspect_advice_result()
                .put_advice_result(aspect.id(), AdviceType::Thrown, value);
        }
    }
    Ok(Some(thrown_rule))
}

/// 执行一条通知并记录它的结果
fn execute_advice(
    activity: &dyn Activity,
    aspect: &AspectRule,
    advice: &AspectAdviceRule,
) -> Result<()> {
    if aspect.is_disabled() {
        return Ok(());
    }
    let action = advice.action();
    prepare_advice_bean(activity, aspect, action)?;
    tracing::trace!("Advice {}", advice);
    match action.execute(activity)? {
        Outcome::Void | Outcome::Branch(_) => {}
        outcome => {
            let Some(value) = outcome.into_value() else {
                return Ok(());
            };
            if let (Action::Echo(_), Some(echos), Some(translet)) =
                (action, value.as_map(), activity.translet())
            {
                for (name, item) in echos {
                    translet.set_attribute(name, item.clone());
                }
            }
            activity
                .aspect_advice_result()
                .put_advice_result(advice.aspect_id(), advice.advice_type(), value);
        }
    }
    Ok(())
}

/// 首次执行切面的 Bean 方法通知前解析并记录通知 Bean
fn prepare_advice_bean(activity: &dyn Activity, aspect: &AspectRule, action: &Action) -> Result<()> {
    if !matches!(action, Action::Advice(_) | Action::AnnotatedAdvice(_)) {
        return Ok(());
    }
    let result = activity.aspect_advice_result();
    if result.aspect_advice_bean(aspect.id()).is_some() {
        return Ok(());
    }
    let bean = match (aspect.advice_bean_class(), aspect.advice_bean_id()) {
        (Some(class_name), bean_id) => activity.get_bean_by_class(class_name, bean_id)?,
        (None, Some(bean_id)) => activity.get_bean(bean_id)?,
        (None, None) => return Ok(()),
    };
    result.put_aspect_advice_bean(aspect.id(), bean);
    Ok(())
}

fn insert_ascending(entries: &mut Vec<AdviceEntry>, entry: AdviceEntry) {
    let order = entry.aspect.order();
    let index = entries
        .iter()
        .position(|e| order < e.aspect.order())
        .unwrap_or(entries.len());
    entries.insert(index, entry);
}

fn insert_descending(entries: &mut Vec<AdviceEntry>, entry: AdviceEntry) {
    let order = entry.aspect.order();
    let index = entries
        .iter()
        .position(|e| order >= e.aspect.order())
        .unwrap_or(entries.len());
    entries.insert(index, entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::Translet;
    use crate::error::{types, Exception};
    use crate::rule::action::{EchoActionRule, InvokeActionRule};
    use crate::rule::item::ItemRule;
    use crate::testing::MockActivity;

    fn record(text: &str) -> InvokeActionRule {
        InvokeActionRule::method_name("record").with_argument(ItemRule::single("text", text))
    }

    fn aspect(id: &str, order: i32) -> Arc<AspectRule> {
        AspectRule::builder(id)
            .order(order)
            .advice_bean_id("calculator")
            .before(record(&format!("before:{}", id)))
            .unwrap()
            .after(record(&format!("after:{}", id)))
            .unwrap()
            .finally(record(&format!("finally:{}", id)))
            .unwrap()
            .build()
    }

    fn ids(rules: Vec<&Arc<AspectAdviceRule>>) -> Vec<&str> {
        rules.into_iter().map(|r| r.aspect_id()).collect()
    }

    #[test]
    fn test_advice_ordering() {
        let registry = AspectAdviceRuleRegistry::new()
            .with(aspect("b", 2))
            .with(aspect("a1", 1))
            .with(aspect("c", 3))
            .with(aspect("a2", 1));
        assert_eq!(ids(registry.before_advice_rules()), vec!["a1", "a2", "b", "c"]);
        assert_eq!(ids(registry.after_advice_rules()), vec!["c", "b", "a2", "a1"]);
        assert_eq!(ids(registry.finally_advice_rules()), vec!["c", "b", "a2", "a1"]);
    }

    #[test]
    fn test_around_runs_in_both_phases() {
        let around = AspectRule::builder("timer")
            .advice_bean_id("calculator")
            .around(record("around"))
            .unwrap()
            .build();
        let registry = AspectAdviceRuleRegistry::new().with(around);
        let activity = MockActivity::with_translet("work");
        let calculator = activity.calculator();
        registry.run(&activity, || Ok(calculator.record_text("body"))).unwrap();
        assert_eq!(calculator.records(), vec!["around", "body", "around"]);
    }

    #[test]
    fn test_run_order_and_advice_result() {
        let registry = AspectAdviceRuleRegistry::new().with(aspect("outer", 1)).with(aspect("inner", 2));
        let activity = MockActivity::with_translet("work");
        let calculator = activity.calculator();
        let value = registry
            .run(&activity, || {
                calculator.record_text("body");
                Ok(7)
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(
            calculator.records(),
            vec![
                "before:outer",
                "before:inner",
                "body",
                "after:inner",
                "after:outer",
                "finally:inner",
                "finally:outer"
            ]
        );
        assert!(activity.get_aspect_advice_bean("outer").is_some());
    }

    #[test]
    fn test_failed_body_skips_after_but_runs_finally() {
        let registry = AspectAdviceRuleRegistry::new().with(aspect("tx", 1));
        let activity = MockActivity::with_translet("work");
        let calculator = activity.calculator();
        let err = registry
            .run::<()>(&activity, || Err(Exception::illegal_state("boom").into()))
            .unwrap_err();
        assert_eq!(err.to_string(), "java.lang.IllegalStateException: boom");
        assert_eq!(calculator.records(), vec!["before:tx", "finally:tx"]);
    }

    #[test]
    fn test_isolated_advice_failure_is_logged_only() {
        let broken = |isolated: bool| {
            let builder = AspectRule::builder("audit").advice_bean_id("calculator");
            let builder = if isolated { builder.isolated() } else { builder };
            builder
                .before(InvokeActionRule::method_name("missing"))
                .unwrap()
                .build()
        };
        let activity = MockActivity::with_translet("work");
        let registry = AspectAdviceRuleRegistry::new().with(broken(true));
        assert_eq!(registry.run(&activity, || Ok(1)).unwrap(), 1);

        let registry = AspectAdviceRuleRegistry::new().with(broken(false));
        let err = registry.run(&activity, || Ok(1)).unwrap_err();
        assert!(matches!(err, ActionError::Execution { .. }));
        assert!(err.root_cause().is_method_not_found());
    }

    #[test]
    fn test_finally_failure_fails_the_request() {
        let aspect = AspectRule::builder("cleanup")
            .advice_bean_id("calculator")
            .finally(InvokeActionRule::method_name("missing"))
            .unwrap()
            .finally(record("still runs"))
            .unwrap()
            .build();
        let registry = AspectAdviceRuleRegistry::new().with(aspect);
        let activity = MockActivity::with_translet("work");
        let err = registry.run(&activity, || Ok(())).unwrap_err();
        assert!(err.root_cause().is_method_not_found());
        assert_eq!(activity.calculator().records(), vec!["still runs"]);
    }

    #[test]
    fn test_disabled_aspect_is_skipped() {
        let aspect = AspectRule::builder("off")
            .disabled(true)
            .advice_bean_id("calculator")
            .before(record("never"))
            .unwrap()
            .build();
        let registry = AspectAdviceRuleRegistry::new().with(aspect);
        let activity = MockActivity::with_translet("work");
        registry.run(&activity, || Ok(())).unwrap();
        assert!(activity.calculator().records().is_empty());
    }

    #[test]
    fn test_echo_advice_sets_attributes() {
        let aspect = AspectRule::builder("meta")
            .before(EchoActionRule::new().with_item(ItemRule::single("startedBy", "${user:system}")))
            .unwrap()
            .build();
        let registry = AspectAdviceRuleRegistry::new().with(aspect);
        let activity = MockActivity::with_translet("work");
        registry.run(&activity, || Ok(())).unwrap();
        let translet = activity.translet().unwrap();
        assert_eq!(translet.get_attribute("startedBy"), Some(Value::from("system")));
        let result = activity.aspect_advice_result().advice_result("meta", AdviceType::Before);
        assert_eq!(result.unwrap().to_string(), "{startedBy=system}");
    }

    #[test]
    fn test_handle_exception_runs_every_matching_rule() {
        let tx = AspectRule::builder("tx")
            .advice_bean_id("calculator")
            .thrown_with(
                ExceptionThrownRule::new().with_type("java.lang.IllegalStateException"),
                record("rollback"),
            )
            .unwrap()
            .build();
        let audit = AspectRule::builder("audit")
            .advice_bean_id("calculator")
            .thrown_with(ExceptionThrownRule::new().with_type("java.lang.Exception"), record("audit"))
            .unwrap()
            .build();
        let unrelated = AspectRule::builder("io")
            .advice_bean_id("calculator")
            .thrown_with(
                ExceptionThrownRule::new().with_type(types::NO_SUCH_BEAN.name()),
                record("io"),
            )
            .unwrap()
            .build();
        let registry = AspectAdviceRuleRegistry::new().with(tx).with(audit).with(unrelated);
        assert_eq!(registry.exception_aspects()[0].id(), "io");

        let activity = MockActivity::with_translet("work");
        let error = ActionError::execution("work", Exception::new(&types::ILLEGAL_STATE, "bad state").into());
        let handled = registry.handle_exception(&activity, &error).unwrap().unwrap();
        assert_eq!(handled.exception_types(), Some(&["java.lang.Exception".to_string()][..]));
        assert_eq!(activity.calculator().records(), vec!["audit", "rollback"]);
    }

    #[test]
    fn test_handler_failure() {
        let build = |isolated: bool| {
            let builder = AspectRule::builder("tx").advice_bean_id("calculator");
            let builder = if isolated { builder.isolated() } else { builder };
            builder
                .thrown_with(ExceptionThrownRule::new(), InvokeActionRule::method_name("missing"))
                .unwrap()
                .build()
        };
        let activity = MockActivity::with_translet("work");
        let error: ActionError = Exception::illegal_argument("bad").into();

        let registry = AspectAdviceRuleRegistry::new().with(build(false));
        let err = registry.handle_exception(&activity, &error).unwrap_err();
        assert!(err.to_string().starts_with("Failed to execute action advice action"));

        let registry = AspectAdviceRuleRegistry::new().with(build(true));
        assert!(registry.handle_exception(&activity, &error).unwrap().is_none());
    }
}
