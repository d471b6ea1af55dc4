//! 处理结果
//!
//! 一次请求的结果按内容（[`ContentResult`]）分组，每个内容由可见动作的结果
//! （[`ActionResult`]）组成。隐藏动作与无返回值的动作不计入。

use crate::action::ActionList;
use crate::activity::Activity;
use crate::error::Result;
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;

/// 单个动作的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    action_id: Option<String>,
    value: Value,
}

impl ActionResult {
    pub fn new(action_id: Option<&str>, value: Value) -> Self {
        Self {
            action_id: action_id.map(str::to_string),
            value,
        }
    }

    pub fn action_id(&self) -> Option<&str> {
        self.action_id.as_deref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// 一个内容（动作列表）产生的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    results: Vec<ActionResult>,
}

impl ContentResult {
    pub fn new(name: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_string),
            results: Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn add_action_result(&mut self, result: ActionResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[ActionResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// 按动作 id 查找；同一 id 出现多次时取最后一个
    pub fn find(&self, action_id: &str) -> Option<&ActionResult> {
        self.results.iter().rev().find(|r| r.action_id() == Some(action_id))
    }

    /// 所有结果值，按执行顺序
    pub fn to_value(&self) -> Value {
        Value::List(self.results.iter().map(|r| r.value.clone()).collect())
    }
}

/// 一次处理的全部结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProcessResult {
    contents: Vec<ContentResult>,
}

impl ProcessResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_content_result(&mut self, content: ContentResult) {
        self.contents.push(content);
    }

    pub fn contents(&self) -> &[ContentResult] {
        &self.contents
    }

    /// 没有任何动作结果
    pub fn is_empty(&self) -> bool {
        self.contents.iter().all(ContentResult::is_empty)
    }

    /// 按动作 id 在所有内容中查找，后出现的优先
    pub fn find(&self, action_id: &str) -> Option<&ActionResult> {
        self.contents.iter().rev().find_map(|c| c.find(action_id))
    }

    /// 带 id 的结果以 id 为键；没有 id 的结果以序号为键
    pub fn to_value(&self) -> Value {
        let mut map = IndexMap::new();
        let mut index = 0;
        for result in self.contents.iter().flat_map(ContentResult::results) {
            let key = match result.action_id() {
                Some(id) => id.to_string(),
                None => {
                    index += 1;
                    format!("#{}", index)
                }
            };
            map.insert(key, result.value.clone());
        }
        Value::Map(map)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// translet 的内容：有序的动作列表
#[derive(Debug, Default)]
pub struct ContentList {
    contents: Vec<ActionList>,
}

impl ContentList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, actions: ActionList) -> Self {
        self.contents.push(actions);
        self
    }

    pub fn push(&mut self, actions: ActionList) {
        self.contents.push(actions);
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionList> {
        self.contents.iter()
    }

    /// 依次执行每个动作列表；空内容不计入结果
    pub fn execute(&self, activity: &dyn Activity) -> Result<ProcessResult> {
        let mut process_result = ProcessResult::new();
        for actions in &self.contents {
            let mut content = ContentResult::new(actions.name());
            actions.execute(activity, &mut content)?;
            if !content.is_empty() {
                process_result.add_content_result(content);
            }
        }
        Ok(process_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::action::EchoActionRule;
    use crate::rule::item::ItemRule;
    use crate::testing::MockActivity;

    #[test]
    fn test_hidden_and_named_results() {
        let activity = MockActivity::with_translet("report");
        let content = ContentList::new()
            .with(
                ActionList::named("summary")
                    .with(EchoActionRule::new().with_action_id("title").with_item(ItemRule::single("text", "Report")))
                    .with(
                        EchoActionRule::new()
                            .with_item(ItemRule::single("secret", "x"))
                            .with_hidden(true),
                    )
                    .with(EchoActionRule::new().with_item(ItemRule::single("note", "anonymous"))),
            )
            .with(ActionList::named("empty"));

        let result = content.execute(&activity).unwrap();
        assert_eq!(result.contents().len(), 1);
        assert_eq!(result.contents()[0].name(), Some("summary"));
        assert_eq!(result.contents()[0].len(), 2);
        assert_eq!(result.find("title").unwrap().value().to_string(), "{text=Report}");
        assert_eq!(result.to_value().to_string(), "{title={text=Report}, #1={note=anonymous}}");
    }

    #[test]
    fn test_to_json() {
        let mut content = ContentResult::new(Some("main"));
        content.add_action_result(ActionResult::new(Some("count"), Value::Int(3)));
        content.add_action_result(ActionResult::new(None, Value::from("ok")));
        let mut result = ProcessResult::new();
        result.add_content_result(content);
        assert_eq!(
            result.to_json().unwrap(),
            r#"[{"name":"main","results":[{"actionId":"count","value":3},{"value":"ok"}]}]"#
        );
        assert!(!result.is_empty());
        assert!(ProcessResult::new().is_empty());
    }
}
