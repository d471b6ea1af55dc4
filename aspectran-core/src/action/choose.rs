//! 条件分支

use super::{wrap_failure, ActionType, Executable, Outcome};
use crate::activity::Activity;
use crate::error::Result;
use crate::rule::choose::ChooseRule;
use crate::util::ToStringBuilder;
use std::fmt;
use std::sync::Arc;

/// 选择第一个条件成立的分支
///
/// 分支按声明顺序求值，命中后不再求值后续分支。命中的分支作为
/// [`Outcome::Branch`] 返回，由所在的动作列表在原位执行。
#[derive(Debug)]
pub struct ChooseAction {
    rule: ChooseRule,
}

impl ChooseAction {
    pub fn new(rule: ChooseRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &ChooseRule {
        &self.rule
    }
}

impl Executable for ChooseAction {
    fn execute(&self, activity: &dyn Activity) -> Result<Outcome> {
        for when in self.rule.when_rules() {
            let matched = match when.expression() {
                Some(expression) => activity
                    .evaluate_condition(expression)
                    .map_err(|e| wrap_failure(self, e))?,
                None => true,
            };
            if matched {
                tracing::trace!("Choose case {} matched {}", self.rule.case_no(), when);
                return Ok(Outcome::Branch(Arc::clone(when)));
            }
        }
        Ok(Outcome::Void)
    }

    fn action_id(&self) -> Option<&str> {
        None
    }

    fn is_hidden(&self) -> bool {
        true
    }

    fn action_type(&self) -> ActionType {
        ActionType::Choose
    }
}

impl fmt::Display for ChooseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("actionType", Some(ActionType::Choose))
            .append("chooseRule", Some(&self.rule));
        write!(f, "{}", tsb)
    }
}
