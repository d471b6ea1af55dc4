//! 条件分支规则

use crate::action::{Action, ActionList};
use crate::util::ToStringBuilder;
use std::fmt;
use std::sync::Arc;

/// 一个分支：条件表达式与其下的动作
///
/// 没有表达式的分支是 `otherwise`，总是命中。
#[derive(Debug)]
pub struct ChooseWhenRule {
    case_no: usize,
    expression: Option<String>,
    actions: ActionList,
}

impl ChooseWhenRule {
    pub fn when(expression: impl Into<String>) -> Self {
        Self {
            case_no: 0,
            expression: Some(expression.into()),
            actions: ActionList::new(),
        }
    }

    pub fn otherwise() -> Self {
        Self {
            case_no: 0,
            expression: None,
            actions: ActionList::new(),
        }
    }

    pub fn with_action(mut self, action: impl Into<Action>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// 分支在所属 choose 中的序号（从 1 开始）
    pub fn case_no(&self) -> usize {
        self.case_no
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn is_otherwise(&self) -> bool {
        self.expression.is_none()
    }

    pub fn actions(&self) -> &ActionList {
        &self.actions
    }
}

impl fmt::Display for ChooseWhenRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("case", Some(self.case_no))
            .append("test", self.expression.as_deref())
            .append_if("otherwise", self.is_otherwise());
        write!(f, "{}", tsb)
    }
}

/// 按顺序求值的一组分支
#[derive(Debug, Default)]
pub struct ChooseRule {
    case_no: usize,
    when_rules: Vec<Arc<ChooseWhenRule>>,
}

impl ChooseRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case_no(mut self, case_no: usize) -> Self {
        self.case_no = case_no;
        self
    }

    /// 追加分支；分支序号按追加顺序编号
    pub fn with_when(mut self, mut rule: ChooseWhenRule) -> Self {
        rule.case_no = self.when_rules.len() + 1;
        self.when_rules.push(Arc::new(rule));
        self
    }

    pub fn case_no(&self) -> usize {
        self.case_no
    }

    pub fn when_rules(&self) -> &[Arc<ChooseWhenRule>] {
        &self.when_rules
    }
}

impl fmt::Display for ChooseRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("case", Some(self.case_no))
            .append("branches", Some(self.when_rules.len()));
        write!(f, "{}", tsb)
    }
}
