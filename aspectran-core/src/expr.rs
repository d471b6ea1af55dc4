//! 令牌求值
//!
//! [`TokenItemEvaluator`] 是 [`ItemEvaluator`] 的默认实现：按当前请求展开项中的令牌，
//! 再按项声明的值类型转换。[`ConditionEvaluator`] 求值 `choose` 分支的条件表达式：
//!
//! ```text
//! expr     := and ( "||" and )*
//! and      := unary ( "&&" unary )*
//! unary    := "!" unary | "(" expr ")" | compare
//! compare  := operand ( ( "==" | "!=" ) operand )?
//! operand  := 'text' | "text" | word
//! ```
//!
//! 操作数可以内嵌令牌，例如 `${mode} == 'fast'`。

use crate::activity::{Activity, ItemEvaluator};
use crate::error::{types, ActionError, Exception, Result};
use crate::rule::item::{ItemRule, ItemRuleMap, ItemType, ItemValueType};
use crate::token::{Token, TokenType, Tokenizer};
use crate::value::{Value, ValueType};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// 基于令牌的项求值器
pub struct TokenItemEvaluator<'a> {
    activity: &'a dyn Activity,
}

impl<'a> TokenItemEvaluator<'a> {
    pub fn new(activity: &'a dyn Activity) -> Self {
        Self { activity }
    }

    /// 展开令牌序列；单个令牌保留其类型，多个令牌拼接为字符串
    pub fn evaluate_tokens(&self, tokens: &[Token]) -> Result<Value> {
        if let [token] = tokens {
            return self.evaluate_token(token);
        }
        let mut text = String::new();
        for token in tokens {
            if let Some(part) = self.evaluate_token(token)?.to_text() {
                text.push_str(&part);
            }
        }
        Ok(Value::String(text))
    }

    pub fn evaluate_token(&self, token: &Token) -> Result<Value> {
        let name = token.name().unwrap_or_default();
        let value = match token.token_type() {
            TokenType::Text => return Ok(Value::from(token.default_value().unwrap_or_default())),
            TokenType::Parameter => self
                .activity
                .translet()
                .and_then(|t| t.get_parameter(name))
                .map(Value::String),
            TokenType::Attribute => self
                .activity
                .translet()
                .and_then(|t| t.get_attribute(name))
                .map(|value| match token.getter_name() {
                    Some(getter) => value.as_map().and_then(|m| m.get(getter)).cloned().unwrap_or_default(),
                    None => value,
                })
                .filter(|value| !value.is_null()),
            TokenType::Property => self.activity.environment().get_string(name).map(Value::String),
            TokenType::Bean => Some(self.evaluate_bean(name, token.getter_name())?),
            TokenType::Template => {
                return Err(Exception::new(
                    &types::UNSUPPORTED_OPERATION,
                    format!("Template token {} cannot be evaluated here", token),
                )
                .into())
            }
        };
        Ok(value
            .or_else(|| token.default_value().map(Value::from))
            .unwrap_or_default())
    }

    /// Bean 本身，或以无参方法读取的属性
    fn evaluate_bean(&self, id: &str, getter: Option<&str>) -> Result<Value> {
        let bean = self.activity.get_bean(id)?;
        let Some(getter) = getter else {
            return Ok(Value::Object(bean));
        };
        let method = self.activity.method_resolver().find_method(&bean, getter, &[])?;
        method.invoke(bean.as_ref(), Default::default())
    }

    fn evaluate_single(&self, rule: &ItemRule) -> Result<Value> {
        if let Ok(Some(tokens)) = rule.tokens() {
            return convert(self.evaluate_tokens(tokens)?, rule.value_type());
        }
        match rule.bean_rule()? {
            Some(bean_rule) => Ok(Value::Object(bean_rule.instantiate()?)),
            None => Ok(Value::Null),
        }
    }

    fn evaluate_list(&self, rule: &ItemRule) -> Result<Value> {
        let mut list = Vec::new();
        if let Ok(Some(tokens_list)) = rule.tokens_list() {
            for tokens in tokens_list {
                let value = convert(self.evaluate_tokens(tokens)?, rule.value_type())?;
                if rule.item_type() == ItemType::Set && list.contains(&value) {
                    continue;
                }
                list.push(value);
            }
        } else if let Some(bean_rules) = rule.bean_rule_list()? {
            for bean_rule in bean_rules {
                list.push(Value::Object(bean_rule.instantiate()?));
            }
        } else {
            return Ok(Value::Null);
        }
        Ok(Value::List(list))
    }

    fn evaluate_map(&self, rule: &ItemRule) -> Result<Value> {
        let mut map = IndexMap::new();
        if let Ok(Some(tokens_map)) = rule.tokens_map() {
            for (name, tokens) in tokens_map {
                let value = convert(self.evaluate_tokens(tokens)?, rule.value_type())?;
                let value = if rule.item_type() == ItemType::Properties {
                    value.to_text().map(Value::String).unwrap_or_default()
                } else {
                    value
                };
                map.insert(name.clone(), value);
            }
        } else if let Some(bean_rules) = rule.bean_rule_map()? {
            for (name, bean_rule) in bean_rules {
                map.insert(name.clone(), Value::Object(bean_rule.instantiate()?));
            }
        } else {
            return Ok(Value::Null);
        }
        Ok(Value::Map(map))
    }
}

impl ItemEvaluator for TokenItemEvaluator<'_> {
    fn evaluate(&self, rules: &ItemRuleMap) -> Result<IndexMap<String, Value>> {
        let mut values = IndexMap::with_capacity(rules.len());
        for rule in rules {
            values.insert(rule.name().to_string(), self.evaluate_item(rule)?);
        }
        Ok(values)
    }

    fn evaluate_item(&self, rule: &ItemRule) -> Result<Value> {
        let value = match rule.item_type() {
            ItemType::Single => self.evaluate_single(rule)?,
            ItemType::Array | ItemType::List | ItemType::Set => self.evaluate_list(rule)?,
            ItemType::Map | ItemType::Properties => self.evaluate_map(rule)?,
        };
        if value.is_null() && rule.is_mandatory() {
            return Err(ActionError::illegal_argument(format!(
                "Item '{}' is mandatory but evaluated to null",
                rule.name()
            )));
        }
        Ok(value)
    }

    fn evaluate_as_multi_value_map(&self, rules: &ItemRuleMap) -> Result<IndexMap<String, Vec<String>>> {
        let mut values = IndexMap::with_capacity(rules.len());
        for rule in rules {
            let texts = match self.evaluate_item(rule)? {
                Value::Null => Vec::new(),
                Value::List(list) => list.iter().filter_map(Value::to_text).collect(),
                other => other.to_text().into_iter().collect(),
            };
            values.insert(rule.name().to_string(), texts);
        }
        Ok(values)
    }
}

/// 按项声明的值类型转换；`null` 保持不变
fn convert(value: Value, value_type: Option<ItemValueType>) -> Result<Value> {
    let Some(value_type) = value_type else {
        return Ok(value);
    };
    if value.is_null() {
        return Ok(value);
    }
    let mismatch = |target: &str| -> ActionError {
        Exception::number_format(format!("For input string: \"{}\" ({})", value, target)).into()
    };
    let converted = match value_type {
        ItemValueType::String => value.to_text().map(Value::String).unwrap_or_default(),
        ItemValueType::Int => Value::Int(value.as_i32().ok_or_else(|| mismatch("i32"))?),
        ItemValueType::Long => Value::Long(value.as_i64().ok_or_else(|| mismatch("i64"))?),
        ItemValueType::Float => Value::Float(value.as_f64().ok_or_else(|| mismatch("f32"))? as f32),
        ItemValueType::Double => Value::Double(value.as_f64().ok_or_else(|| mismatch("f64"))?),
        ItemValueType::Boolean => Value::Bool(value.as_bool().ok_or_else(|| {
            ActionError::illegal_argument(format!("Cannot convert '{}' to bool", value))
        })?),
        ItemValueType::Parameters => match &value {
            Value::String(text) => parse_parameters(text)?,
            _ => value.clone(),
        },
        ItemValueType::File | ItemValueType::MultipartFile | ItemValueType::Bean => value.clone(),
    };
    Ok(converted)
}

/// 把 JSON 文本解析为嵌套的参数映射
fn parse_parameters(text: &str) -> Result<Value> {
    let json: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        Exception::illegal_argument(format!("Malformed parameters text: {}", text)).with_source(e)
    })?;
    Ok(from_json(json))
}

fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Long(i),
            None => n.as_f64().map(Value::Double).unwrap_or_default(),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(list) => Value::List(list.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            Value::Map(map.into_iter().map(|(k, v)| (k, from_json(v))).collect())
        }
    }
}

static LEXEME: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r#"\|\||&&|==|!=|!|\(|\)|'[^']*'|"[^"]*"|[^\s()!=&|'"]+"#));

/// 条件表达式求值器
pub struct ConditionEvaluator<'a> {
    evaluator: TokenItemEvaluator<'a>,
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(activity: &'a dyn Activity) -> Self {
        Self {
            evaluator: TokenItemEvaluator::new(activity),
        }
    }

    pub fn evaluate(&self, expression: &str) -> Result<bool> {
        let lexer = LEXEME
            .as_ref()
            .map_err(|e| ActionError::IllegalState(format!("Invalid condition lexer; {}", e)))?;
        let lexemes: Vec<&str> = lexer.find_iter(expression).map(|m| m.as_str()).collect();
        let mut parser = Parser {
            evaluator: &self.evaluator,
            lexemes: &lexemes,
            pos: 0,
        };
        let result = parser.or().map_err(|e| malformed(expression, Some(e)))?;
        if parser.pos != lexemes.len() {
            return Err(malformed(expression, None));
        }
        Ok(result)
    }
}

fn malformed(expression: &str, cause: Option<ActionError>) -> ActionError {
    let message = format!("Malformed condition expression '{}'", expression);
    match cause {
        Some(e) => ActionError::illegal_argument_caused_by(message, e),
        None => ActionError::illegal_argument(message),
    }
}

struct Parser<'e, 'l> {
    evaluator: &'e TokenItemEvaluator<'e>,
    lexemes: &'l [&'l str],
    pos: usize,
}

impl<'l> Parser<'_, 'l> {
    fn peek(&self) -> Option<&'l str> {
        self.lexemes.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<&'l str> {
        let lexeme = self
            .lexemes
            .get(self.pos)
            .copied()
            .ok_or_else(|| ActionError::illegal_argument("Unexpected end of expression"))?;
        self.pos += 1;
        Ok(lexeme)
    }

    fn or(&mut self) -> Result<bool> {
        let mut result = self.and()?;
        while self.peek() == Some("||") {
            self.pos += 1;
            let rhs = self.and()?;
            result = result || rhs;
        }
        Ok(result)
    }

    fn and(&mut self) -> Result<bool> {
        let mut result = self.unary()?;
        while self.peek() == Some("&&") {
            self.pos += 1;
            let rhs = self.unary()?;
            result = result && rhs;
        }
        Ok(result)
    }

    fn unary(&mut self) -> Result<bool> {
        match self.peek() {
            Some("!") => {
                self.pos += 1;
                Ok(!self.unary()?)
            }
            Some("(") => {
                self.pos += 1;
                let result = self.or()?;
                match self.next()? {
                    ")" => Ok(result),
                    other => Err(ActionError::illegal_argument(format!("Expected ')' but found '{}'", other))),
                }
            }
            _ => self.compare(),
        }
    }

    fn compare(&mut self) -> Result<bool> {
        let lhs = self.operand()?;
        match self.peek() {
            Some("==") => {
                self.pos += 1;
                let rhs = self.operand()?;
                Ok(lhs.to_text() == rhs.to_text())
            }
            Some("!=") => {
                self.pos += 1;
                let rhs = self.operand()?;
                Ok(lhs.to_text() != rhs.to_text())
            }
            _ => Ok(truthy(&lhs)),
        }
    }

    fn operand(&mut self) -> Result<Value> {
        let lexeme = self.next()?;
        if matches!(lexeme, "||" | "&&" | "==" | "!=" | "!" | "(" | ")") {
            return Err(ActionError::illegal_argument(format!("Unexpected '{}'", lexeme)));
        }
        let quoted = lexeme.len() >= 2
            && ((lexeme.starts_with('\'') && lexeme.ends_with('\''))
                || (lexeme.starts_with('"') && lexeme.ends_with('"')));
        if quoted {
            let inner = &lexeme[1..lexeme.len() - 1];
            return self.evaluator.evaluate_tokens(&Tokenizer::tokenize(inner, false));
        }
        if lexeme == "null" {
            return Ok(Value::Null);
        }
        self.evaluator.evaluate_tokens(&Tokenizer::tokenize(lexeme, false))
    }
}

/// 值的真假
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => Value::from(s.as_str()).as_bool().unwrap_or(!s.is_empty()),
        Value::List(list) => !list.is_empty(),
        Value::Map(map) => !map.is_empty(),
        Value::Object(_) => true,
        other => match other.value_type() {
            ValueType::Float | ValueType::Double => other.as_f64().map_or(false, |v| v != 0.0),
            _ => other.as_i64().map_or(true, |v| v != 0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::bean::BeanRule;
    use crate::testing::MockActivity;

    fn typed(name: &str, text: &str, value_type: ItemValueType) -> ItemRule {
        let mut item = ItemRule::single(name, text);
        item.set_value_type(value_type);
        item
    }

    #[test]
    fn test_single_token_keeps_type() {
        let activity = MockActivity::with_translet("t");
        activity
            .translet()
            .unwrap()
            .set_attribute("count", Value::Int(3));
        let evaluator = TokenItemEvaluator::new(&activity);
        let value = evaluator.evaluate_item(&ItemRule::single("n", "@{count}")).unwrap();
        assert_eq!(value, Value::Int(3));
        let value = evaluator.evaluate_item(&ItemRule::single("n", "total: @{count}")).unwrap();
        assert_eq!(value, Value::from("total: 3"));
    }

    #[test]
    fn test_sources_and_defaults() {
        let activity = MockActivity::with_translet("t")
            .with_parameter("name", "kim")
            .with_property("app.title", "Shop");
        let mut order = IndexMap::new();
        order.insert("id".to_string(), Value::Long(9));
        activity.translet().unwrap().set_attribute("order", Value::Map(order));

        let evaluator = TokenItemEvaluator::new(&activity);
        let rules = ItemRuleMap::new()
            .with(ItemRule::single("name", "${name}"))
            .with(ItemRule::single("missing", "${nobody:guest}"))
            .with(ItemRule::single("orderId", "@{order^id}"))
            .with(ItemRule::single("title", "%{app.title}"))
            .with(ItemRule::single("label", "#{calculator^label}"));
        let values = evaluator.evaluate(&rules).unwrap();
        assert_eq!(values["name"], Value::from("kim"));
        assert_eq!(values["missing"], Value::from("guest"));
        assert_eq!(values["orderId"], Value::Long(9));
        assert_eq!(values["title"], Value::from("Shop"));
        assert_eq!(values["label"], Value::from(""));
    }

    #[test]
    fn test_value_type_conversion() {
        let activity = MockActivity::with_translet("t").with_parameter("qty", "12");
        let evaluator = TokenItemEvaluator::new(&activity);
        assert_eq!(
            evaluator.evaluate_item(&typed("qty", "${qty}", ItemValueType::Int)).unwrap(),
            Value::Int(12)
        );
        assert_eq!(
            evaluator.evaluate_item(&typed("flag", "yes", ItemValueType::Boolean)).unwrap(),
            Value::Bool(true)
        );
        let err = evaluator
            .evaluate_item(&typed("bad", "twelve", ItemValueType::Long))
            .unwrap_err();
        assert!(err.exception_type().is_subtype_of(&types::NUMBER_FORMAT));

        let params = evaluator
            .evaluate_item(&typed("p", r#"{"a": 1, "b": ["x"]}"#, ItemValueType::Parameters))
            .unwrap();
        assert_eq!(params.to_string(), "{a=1, b=[x]}");
    }

    #[test]
    fn test_collections() {
        let activity = MockActivity::with_translet("t").with_parameter("tag", "red");
        let evaluator = TokenItemEvaluator::new(&activity);

        let mut set = ItemRule::with_type(ItemType::Set, "tags");
        set.add_value("${tag}").unwrap();
        set.add_value("blue").unwrap();
        set.add_value("red").unwrap();
        assert_eq!(evaluator.evaluate_item(&set).unwrap().to_string(), "[red, blue]");

        let mut map = ItemRule::with_type(ItemType::Map, "colors");
        map.put_value("primary", "${tag}").unwrap();
        map.put_value("secondary", "${other:green}").unwrap();
        assert_eq!(
            evaluator.evaluate_item(&map).unwrap().to_string(),
            "{primary=red, secondary=green}"
        );

        let multi = evaluator
            .evaluate_as_multi_value_map(&ItemRuleMap::new().with(set).with(ItemRule::single("one", "1")))
            .unwrap();
        assert_eq!(multi["tags"], vec!["red", "blue"]);
        assert_eq!(multi["one"], vec!["1"]);
    }

    #[test]
    fn test_bean_item_and_mandatory() {
        let activity = MockActivity::new();
        let evaluator = TokenItemEvaluator::new(&activity);

        let mut item = ItemRule::new("holder");
        item.set_bean_rule(BeanRule::of("Holder", || String::from("held"))).unwrap();
        let value = evaluator.evaluate_item(&item).unwrap();
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("held"));

        let mut mandatory = ItemRule::single("id", "${id}");
        mandatory.set_mandatory(true);
        assert!(evaluator.evaluate_item(&mandatory).is_err());
    }

    #[test]
    fn test_template_token_is_unsupported() {
        let activity = MockActivity::new();
        let evaluator = TokenItemEvaluator::new(&activity);
        let err = evaluator.evaluate_item(&ItemRule::single("page", "~{header}")).unwrap_err();
        assert_eq!(err.exception_type(), &types::UNSUPPORTED_OPERATION);
    }

    #[test]
    fn test_conditions() {
        let activity = MockActivity::with_translet("t")
            .with_parameter("mode", "fast")
            .with_parameter("debug", "false");
        let conditions = ConditionEvaluator::new(&activity);
        assert!(conditions.evaluate("${mode} == 'fast'").unwrap());
        assert!(conditions.evaluate("${mode} != \"slow\"").unwrap());
        assert!(!conditions.evaluate("${debug}").unwrap());
        assert!(conditions.evaluate("!${debug} && ${mode}").unwrap());
        assert!(conditions.evaluate("${missing} || (true && !false)").unwrap());
        assert!(!conditions.evaluate("${missing}").unwrap());
        assert!(conditions.evaluate("${missing} == null").unwrap());
        assert!(conditions.evaluate("${mode} ==").is_err());
        assert!(conditions.evaluate("(true").is_err());
        assert!(conditions.evaluate("true false").is_err());
    }
}
