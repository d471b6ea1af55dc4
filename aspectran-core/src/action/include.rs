//! 执行嵌套 translet

use super::{ActionType, Executable, Outcome};
use crate::activity::{Activity, NestedRequest};
use crate::error::{ActionError, Result};
use crate::rule::action::IncludeActionRule;
use crate::util::ToStringBuilder;
use std::fmt;

/// 同步执行另一个 translet，把它的处理结果作为本动作的结果
#[derive(Debug)]
pub struct IncludeAction {
    rule: IncludeActionRule,
}

impl IncludeAction {
    pub fn new(rule: IncludeActionRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &IncludeActionRule {
        &self.rule
    }

    fn request(&self, activity: &dyn Activity) -> Result<NestedRequest> {
        let evaluator = activity.item_evaluator();
        let attributes = match self.rule.attribute_item_rule_map() {
            Some(items) => evaluator.evaluate(&items.resolve(activity.environment()))?,
            None => Default::default(),
        };
        let parameters = match self.rule.parameter_item_rule_map() {
            Some(items) => evaluator.evaluate_as_multi_value_map(&items.resolve(activity.environment()))?,
            None => Default::default(),
        };
        Ok(NestedRequest {
            translet_name: self.rule.translet_name().to_string(),
            method: self.rule.method_type(),
            attributes,
            parameters,
        })
    }
}

impl Executable for IncludeAction {
    fn execute(&self, activity: &dyn Activity) -> Result<Outcome> {
        let result = self
            .request(activity)
            .and_then(|request| activity.run_nested(request))
            .map_err(|e| ActionError::execution(self, e))?;
        match result {
            Some(process_result) if !process_result.is_empty() => Ok(Outcome::Process(process_result)),
            _ => Ok(Outcome::Void),
        }
    }

    fn action_id(&self) -> Option<&str> {
        self.rule.action_id()
    }

    fn is_hidden(&self) -> bool {
        self.rule.is_hidden()
    }

    fn action_type(&self) -> ActionType {
        ActionType::Include
    }
}

impl fmt::Display for IncludeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("actionType", Some(ActionType::Include))
            .append("includeActionRule", Some(&self.rule));
        write!(f, "{}", tsb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ActionResult, ContentResult, ProcessResult};
    use crate::rule::item::ItemRule;
    use crate::testing::MockActivity;
    use crate::value::Value;

    #[test]
    fn test_nested_result() {
        let mut nested = ProcessResult::new();
        let mut content = ContentResult::new(None);
        content.add_action_result(ActionResult::new(Some("total"), Value::Long(3)));
        nested.add_content_result(content);

        let activity = MockActivity::with_translet("outer")
            .with_parameter("id", "7")
            .with_nested_result(Some(nested));
        let rule = IncludeActionRule::new("inner")
            .with_action_id("inner")
            .with_parameter(ItemRule::single("orderId", "${id}"))
            .with_attribute(ItemRule::single("source", "outer"));
        let outcome = IncludeAction::new(rule).execute(&activity).unwrap();
        assert!(matches!(outcome, Outcome::Process(_)));

        let request = activity.last_nested_request().unwrap();
        assert_eq!(request.translet_name, "inner");
        assert_eq!(request.parameters["orderId"], vec!["7".to_string()]);
        assert_eq!(request.attributes["source"], Value::from("outer"));
    }

    #[test]
    fn test_no_nested_result_is_void() {
        let activity = MockActivity::new().with_nested_result(None);
        let outcome = IncludeAction::new(IncludeActionRule::new("inner")).execute(&activity).unwrap();
        assert!(outcome.is_void());

        let activity = MockActivity::new().with_nested_result(Some(ProcessResult::new()));
        let outcome = IncludeAction::new(IncludeActionRule::new("inner")).execute(&activity).unwrap();
        assert!(outcome.is_void());
    }
}
