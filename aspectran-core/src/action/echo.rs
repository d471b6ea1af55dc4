//! 输出项值

use super::{wrap_failure, ActionType, Executable, Outcome};
use crate::activity::Activity;
use crate::error::Result;
use crate::rule::action::EchoActionRule;
use crate::util::ToStringBuilder;
use crate::value::Value;
use std::fmt;

/// 求值项并把 名称 -> 值 作为结果
#[derive(Debug)]
pub struct EchoAction {
    rule: EchoActionRule,
}

impl EchoAction {
    pub fn new(rule: EchoActionRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &EchoActionRule {
        &self.rule
    }
}

impl Executable for EchoAction {
    fn execute(&self, activity: &dyn Activity) -> Result<Outcome> {
        let Some(items) = self.rule.echo_item_rule_map() else {
            return Ok(Outcome::Void);
        };
        let items = items.resolve(activity.environment());
        let values = activity
            .item_evaluator()
            .evaluate(&items)
            .map_err(|e| wrap_failure(self, e))?;
        if values.is_empty() {
            Ok(Outcome::Void)
        } else {
            Ok(Outcome::Value(Value::Map(values)))
        }
    }

    fn action_id(&self) -> Option<&str> {
        self.rule.action_id()
    }

    fn is_hidden(&self) -> bool {
        self.rule.is_hidden()
    }

    fn action_type(&self) -> ActionType {
        ActionType::Echo
    }
}

impl fmt::Display for EchoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("actionType", Some(ActionType::Echo))
            .append("echoActionRule", Some(&self.rule));
        write!(f, "{}", tsb)
    }
}
