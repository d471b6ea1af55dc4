//! 设置响应头

use super::{wrap_failure, ActionType, Executable, Outcome};
use crate::activity::Activity;
use crate::error::Result;
use crate::rule::action::HeaderActionRule;
use crate::util::ToStringBuilder;
use std::fmt;

/// 求值项并逐个添加到响应头
#[derive(Debug)]
pub struct HeaderAction {
    rule: HeaderActionRule,
}

impl HeaderAction {
    pub fn new(rule: HeaderActionRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &HeaderActionRule {
        &self.rule
    }
}

impl Executable for HeaderAction {
    fn execute(&self, activity: &dyn Activity) -> Result<Outcome> {
        let Some(items) = self.rule.header_item_rule_map() else {
            return Ok(Outcome::Void);
        };
        let Some(translet) = activity.translet() else {
            tracing::debug!("No translet to add headers to; {}", self);
            return Ok(Outcome::Void);
        };
        let items = items.resolve(activity.environment());
        let headers = activity
            .item_evaluator()
            .evaluate_as_multi_value_map(&items)
            .map_err(|e| wrap_failure(self, e))?;
        for (name, values) in &headers {
            for value in values {
                translet.add_header(name, value);
            }
        }
        Ok(Outcome::Void)
    }

    fn action_id(&self) -> Option<&str> {
        self.rule.action_id()
    }

    fn is_hidden(&self) -> bool {
        self.rule.is_hidden()
    }

    fn action_type(&self) -> ActionType {
        ActionType::Header
    }
}

impl fmt::Display for HeaderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("actionType", Some(ActionType::Header))
            .append("headerActionRule", Some(&self.rule));
        write!(f, "{}", tsb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::Translet;
    use crate::rule::item::{ItemRule, ItemType};
    use crate::testing::MockActivity;

    #[test]
    fn test_headers_added() {
        let activity = MockActivity::with_translet("download").with_parameter("file", "a.txt");
        let mut accept = ItemRule::with_type(ItemType::List, "Cache-Control");
        accept.add_value("no-cache").unwrap();
        accept.add_value("no-store").unwrap();
        let rule = HeaderActionRule::new()
            .with_header(ItemRule::single("Content-Disposition", "attachment; filename=${file}"))
            .with_header(accept);

        let outcome = HeaderAction::new(rule).execute(&activity).unwrap();
        assert!(outcome.is_void());
        let translet = activity.translet().unwrap();
        assert_eq!(
            translet.header_values("Content-Disposition"),
            vec!["attachment; filename=a.txt".to_string()]
        );
        assert_eq!(translet.header_values("Cache-Control").len(), 2);
    }

    #[test]
    fn test_no_translet_is_ignored() {
        let activity = MockActivity::new();
        let rule = HeaderActionRule::new().with_header(ItemRule::single("X-Trace", "1"));
        assert!(HeaderAction::new(rule).execute(&activity).unwrap().is_void());
    }
}
