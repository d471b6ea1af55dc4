//! 项规则
//!
//! 项（item）是一个带名称的值声明，用于动作参数、Bean 属性、嵌套请求的属性与参数、
//! 响应头。值以令牌序列保存，求值时才根据当前请求展开。

use crate::config::Environment;
use crate::error::RuleError;
use crate::rule::bean::BeanRule;
use crate::token::{self, Token, Tokenizer};
use crate::util::ToStringBuilder;
use crate::value::{Value, ValueType};
use indexmap::IndexMap;
use std::borrow::Cow;
use std::fmt;

const ARRAY_SUFFIX: &str = "[]";
const MAP_SUFFIX: &str = "{}";
const AUTO_NAME_PREFIX: &str = "item#";
const SECRET_MASK: &str = "****";

/// 项的结构类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemType {
    #[default]
    Single,
    Array,
    List,
    Set,
    Map,
    Properties,
}

impl ItemType {
    pub fn resolve(alias: &str) -> Option<Self> {
        match alias {
            "single" => Some(ItemType::Single),
            "array" => Some(ItemType::Array),
            "list" => Some(ItemType::List),
            "set" => Some(ItemType::Set),
            "map" => Some(ItemType::Map),
            "properties" => Some(ItemType::Properties),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Single => "single",
            ItemType::Array => "array",
            ItemType::List => "list",
            ItemType::Set => "set",
            ItemType::Map => "map",
            ItemType::Properties => "properties",
        }
    }

    pub fn is_listable(&self) -> bool {
        matches!(self, ItemType::Array | ItemType::List | ItemType::Set)
    }

    pub fn is_mappable(&self) -> bool {
        matches!(self, ItemType::Map | ItemType::Properties)
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 项的值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemValueType {
    String,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Parameters,
    File,
    MultipartFile,
    Bean,
}

impl ItemValueType {
    pub fn resolve(alias: &str) -> Option<Self> {
        match alias {
            "string" => Some(ItemValueType::String),
            "int" => Some(ItemValueType::Int),
            "long" => Some(ItemValueType::Long),
            "float" => Some(ItemValueType::Float),
            "double" => Some(ItemValueType::Double),
            "boolean" => Some(ItemValueType::Boolean),
            "parameters" => Some(ItemValueType::Parameters),
            "file" => Some(ItemValueType::File),
            "multipart-file" => Some(ItemValueType::MultipartFile),
            "bean" => Some(ItemValueType::Bean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemValueType::String => "string",
            ItemValueType::Int => "int",
            ItemValueType::Long => "long",
            ItemValueType::Float => "float",
            ItemValueType::Double => "double",
            ItemValueType::Boolean => "boolean",
            ItemValueType::Parameters => "parameters",
            ItemValueType::File => "file",
            ItemValueType::MultipartFile => "multipart-file",
            ItemValueType::Bean => "bean",
        }
    }
}

impl fmt::Display for ItemValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 项的值；同一时刻只有一种形态
#[derive(Debug, Clone, Default)]
enum ItemValue {
    #[default]
    Empty,
    Tokens(Vec<Token>),
    TokensList(Vec<Vec<Token>>),
    TokensMap(IndexMap<String, Vec<Token>>),
    Bean(Box<BeanRule>),
    BeanList(Vec<BeanRule>),
    BeanMap(IndexMap<String, BeanRule>),
}

/// 项规则
#[derive(Debug, Clone, Default)]
pub struct ItemRule {
    item_type: ItemType,
    name: String,
    value_type: Option<ItemValueType>,
    tokenize: Option<bool>,
    value: ItemValue,
    mandatory: Option<bool>,
    secret: Option<bool>,
    auto_named: bool,
}

impl ItemRule {
    /// 以名称创建；名称以 `[]` 结尾为数组项，以 `{}` 结尾为映射项
    pub fn new(name: &str) -> Self {
        let mut rule = Self::default();
        rule.set_name(name);
        rule
    }

    /// 指定结构类型创建
    pub fn with_type(item_type: ItemType, name: &str) -> Self {
        let mut rule = Self {
            item_type,
            ..Self::default()
        };
        rule.set_name(name);
        rule
    }

    /// 单值项
    pub fn single(name: &str, text: &str) -> Self {
        let mut rule = Self::with_type(ItemType::Single, name);
        rule.value = ItemValue::Tokens(rule.make_tokens(text));
        rule
    }

    /// 由文本形式的类型名称构建
    ///
    /// 未给出名称时标记为自动命名，放入 [`ItemRuleMap`] 时分配 `item#N`。
    pub fn new_instance(
        item_type: Option<&str>,
        name: Option<&str>,
        value_type: Option<&str>,
        tokenize: Option<bool>,
        mandatory: Option<bool>,
        secret: Option<bool>,
    ) -> Result<Self, RuleError> {
        let mut rule = Self::default();
        if let Some(alias) = item_type {
            rule.item_type = ItemType::resolve(alias)
                .ok_or_else(|| RuleError::IllegalRule(format!("No item type for '{}'", alias)))?;
        }
        match name {
            Some(name) if !name.is_empty() => rule.set_name(name),
            _ => rule.auto_named = true,
        }
        rule.tokenize = tokenize;
        if let Some(alias) = value_type {
            rule.value_type = Some(ItemValueType::resolve(alias).ok_or_else(|| {
                RuleError::IllegalRule(format!("No item value type for '{}'", alias))
            })?);
        }
        rule.mandatory = mandatory;
        rule.secret = secret;
        Ok(rule)
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        if let Some(stripped) = name.strip_suffix(ARRAY_SUFFIX) {
            self.name = stripped.to_string();
            self.item_type = ItemType::Array;
        } else if let Some(stripped) = name.strip_suffix(MAP_SUFFIX) {
            self.name = stripped.to_string();
            self.item_type = ItemType::Map;
        } else {
            self.name = name.to_string();
        }
    }

    pub fn value_type(&self) -> Option<ItemValueType> {
        self.value_type
    }

    pub fn set_value_type(&mut self, value_type: ItemValueType) {
        self.value_type = Some(value_type);
    }

    /// 字符串是否解析内嵌令牌（默认 `true`）
    pub fn is_tokenize(&self) -> bool {
        self.tokenize.unwrap_or(true)
    }

    pub fn set_tokenize(&mut self, tokenize: bool) {
        self.tokenize = Some(tokenize);
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory.unwrap_or(false)
    }

    pub fn set_mandatory(&mut self, mandatory: bool) {
        self.mandatory = Some(mandatory);
    }

    pub fn is_secret(&self) -> bool {
        self.secret.unwrap_or(false)
    }

    pub fn set_secret(&mut self, secret: bool) {
        self.secret = Some(secret);
    }

    pub fn is_auto_named(&self) -> bool {
        self.auto_named
    }

    pub fn is_listable_type(&self) -> bool {
        self.item_type.is_listable()
    }

    pub fn is_mappable_type(&self) -> bool {
        self.item_type.is_mappable()
    }

    fn make_tokens(&self, text: &str) -> Vec<Token> {
        if self.is_tokenize() {
            Tokenizer::tokenize(text, false)
        } else {
            vec![Token::text(text)]
        }
    }

    fn require_single(&self) -> Result<(), RuleError> {
        if self.item_type != ItemType::Single {
            return Err(RuleError::IllegalArgument(
                "The type of this item must be 'single'".to_string(),
            ));
        }
        Ok(())
    }

    fn require_listable(&self) -> Result<(), RuleError> {
        if !self.is_listable_type() {
            return Err(RuleError::IllegalArgument(
                "The type of this item must be 'array', 'list' or 'set'".to_string(),
            ));
        }
        Ok(())
    }

    fn require_mappable(&self) -> Result<(), RuleError> {
        if !self.is_mappable_type() {
            return Err(RuleError::IllegalArgument(
                "The type of this item must be 'map' or 'properties'".to_string(),
            ));
        }
        Ok(())
    }

    /// 设置单值项的值
    pub fn set_value(&mut self, text: &str) -> Result<(), RuleError> {
        let tokens = self.make_tokens(text);
        self.set_tokens(tokens)
    }

    pub fn set_tokens(&mut self, tokens: Vec<Token>) -> Result<(), RuleError> {
        self.require_single()?;
        self.value = ItemValue::Tokens(tokens);
        Ok(())
    }

    /// 向列表项追加一个值
    pub fn add_value(&mut self, text: &str) -> Result<(), RuleError> {
        let tokens = self.make_tokens(text);
        self.require_listable()?;
        match &mut self.value {
            ItemValue::TokensList(list) => list.push(tokens),
            other => *other = ItemValue::TokensList(vec![tokens]),
        }
        Ok(())
    }

    /// 向映射项放入一个值
    pub fn put_value(&mut self, name: &str, text: &str) -> Result<(), RuleError> {
        let tokens = self.make_tokens(text);
        self.require_mappable()?;
        match &mut self.value {
            ItemValue::TokensMap(map) => {
                map.insert(name.to_string(), tokens);
            }
            other => {
                let mut map = IndexMap::new();
                map.insert(name.to_string(), tokens);
                *other = ItemValue::TokensMap(map);
            }
        }
        Ok(())
    }

    /// 单值项的内嵌 Bean
    pub fn set_bean_rule(&mut self, bean_rule: BeanRule) -> Result<(), RuleError> {
        if self.item_type != ItemType::Single {
            return Err(RuleError::IllegalState(
                "The type of this item must be 'single'".to_string(),
            ));
        }
        self.value_type.get_or_insert(ItemValueType::Bean);
        self.value = ItemValue::Bean(Box::new(bean_rule));
        Ok(())
    }

    pub fn add_bean_rule(&mut self, bean_rule: BeanRule) -> Result<(), RuleError> {
        self.require_listable()?;
        self.value_type.get_or_insert(ItemValueType::Bean);
        match &mut self.value {
            ItemValue::BeanList(list) => list.push(bean_rule),
            other => *other = ItemValue::BeanList(vec![bean_rule]),
        }
        Ok(())
    }

    pub fn put_bean_rule(&mut self, name: &str, bean_rule: BeanRule) -> Result<(), RuleError> {
        self.require_mappable()?;
        self.value_type.get_or_insert(ItemValueType::Bean);
        match &mut self.value {
            ItemValue::BeanMap(map) => {
                map.insert(name.to_string(), bean_rule);
            }
            other => {
                let mut map = IndexMap::new();
                map.insert(name.to_string(), bean_rule);
                *other = ItemValue::BeanMap(map);
            }
        }
        Ok(())
    }

    fn wrong_shape(&self, expected: &str) -> RuleError {
        RuleError::IllegalState(format!(
            "Item '{}' of type '{}' does not hold {}",
            self.name, self.item_type, expected
        ))
    }

    /// 单值项的令牌；未设置值时为 `None`
    pub fn tokens(&self) -> Result<Option<&[Token]>, RuleError> {
        match &self.value {
            ItemValue::Tokens(tokens) => Ok(Some(tokens)),
            ItemValue::Empty if self.item_type == ItemType::Single => Ok(None),
            _ => Err(self.wrong_shape("tokens")),
        }
    }

    pub fn tokens_list(&self) -> Result<Option<&[Vec<Token>]>, RuleError> {
        match &self.value {
            ItemValue::TokensList(list) => Ok(Some(list)),
            ItemValue::Empty if self.is_listable_type() => Ok(None),
            _ => Err(self.wrong_shape("a tokens list")),
        }
    }

    pub fn tokens_map(&self) -> Result<Option<&IndexMap<String, Vec<Token>>>, RuleError> {
        match &self.value {
            ItemValue::TokensMap(map) => Ok(Some(map)),
            ItemValue::Empty if self.is_mappable_type() => Ok(None),
            _ => Err(self.wrong_shape("a tokens map")),
        }
    }

    pub fn bean_rule(&self) -> Result<Option<&BeanRule>, RuleError> {
        match &self.value {
            ItemValue::Bean(rule) => Ok(Some(rule)),
            ItemValue::Empty if self.item_type == ItemType::Single => Ok(None),
            _ => Err(self.wrong_shape("a bean rule")),
        }
    }

    pub fn bean_rule_list(&self) -> Result<Option<&[BeanRule]>, RuleError> {
        match &self.value {
            ItemValue::BeanList(list) => Ok(Some(list)),
            ItemValue::Empty if self.is_listable_type() => Ok(None),
            _ => Err(self.wrong_shape("a bean rule list")),
        }
    }

    pub fn bean_rule_map(&self) -> Result<Option<&IndexMap<String, BeanRule>>, RuleError> {
        match &self.value {
            ItemValue::BeanMap(map) => Ok(Some(map)),
            ItemValue::Empty if self.is_mappable_type() => Ok(None),
            _ => Err(self.wrong_shape("a bean rule map")),
        }
    }

    /// 单值项的字符串形式，由令牌还原
    pub fn value(&self) -> Option<String> {
        match &self.value {
            ItemValue::Tokens(tokens) => Some(token::stringify(tokens)),
            _ => None,
        }
    }

    pub fn value_list(&self) -> Option<Vec<String>> {
        match &self.value {
            ItemValue::TokensList(list) => Some(list.iter().map(|t| token::stringify(t)).collect()),
            _ => None,
        }
    }

    pub fn value_map(&self) -> Option<IndexMap<String, String>> {
        match &self.value {
            ItemValue::TokensMap(map) => Some(
                map.iter()
                    .map(|(k, t)| (k.clone(), token::stringify(t)))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// 项中出现的全部令牌，按声明顺序
    pub fn all_tokens(&self) -> Vec<&Token> {
        match &self.value {
            ItemValue::Tokens(tokens) => tokens.iter().collect(),
            ItemValue::TokensList(list) => list.iter().flatten().collect(),
            ItemValue::TokensMap(map) => map.values().flatten().collect(),
            _ => Vec::new(),
        }
    }

    pub fn contains_token(&self, token: &Token) -> bool {
        self.all_tokens().into_iter().any(|t| t == token)
    }

    /// 按名称查找方法时该实参的类型
    ///
    /// 声明了值类型时取声明类型，否则取实际值的运行期类型。
    pub fn prototype_type(&self, value: &Value) -> ValueType {
        if self.is_listable_type() {
            return ValueType::List;
        }
        if self.is_mappable_type() {
            return ValueType::Map;
        }
        match self.value_type {
            Some(ItemValueType::String) => ValueType::String,
            Some(ItemValueType::Int) => ValueType::Int,
            Some(ItemValueType::Long) => ValueType::Long,
            Some(ItemValueType::Float) => ValueType::Float,
            Some(ItemValueType::Double) => ValueType::Double,
            Some(ItemValueType::Boolean) => ValueType::Bool,
            Some(ItemValueType::Parameters) => ValueType::Map,
            Some(ItemValueType::File) | Some(ItemValueType::MultipartFile) => ValueType::Object,
            Some(ItemValueType::Bean) | None => value.value_type(),
        }
    }
}

fn render_tokens(tokens: &[Token]) -> String {
    token::stringify(tokens)
}

impl fmt::Display for ItemRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tsb = ToStringBuilder::new();
        tsb.append("type", Some(self.item_type))
            .append("name", Some(&self.name))
            .append("valueType", self.value_type);
        let value = match &self.value {
            ItemValue::Empty => None,
            _ if self.is_secret() => Some(SECRET_MASK.to_string()),
            ItemValue::Tokens(tokens) => Some(render_tokens(tokens)),
            ItemValue::TokensList(list) => Some(format!(
                "[{}]",
                list.iter().map(|t| render_tokens(t)).collect::<Vec<_>>().join(", ")
            )),
            ItemValue::TokensMap(map) => Some(format!(
                "{{{}}}",
                map.iter()
                    .map(|(k, t)| format!("{}={}", k, render_tokens(t)))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            ItemValue::Bean(rule) => Some(rule.to_string()),
            ItemValue::BeanList(list) => Some(format!(
                "[{}]",
                list.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            )),
            ItemValue::BeanMap(map) => Some(format!(
                "{{{}}}",
                map.iter()
                    .map(|(k, r)| format!("{}={}", k, r))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        };
        tsb.append("value", value)
            .append("tokenize", self.tokenize)
            .append("mandatory", self.mandatory)
            .append("secret", self.secret);
        write!(f, "{}", tsb)
    }
}

/// 按插入顺序保存的项规则映射
///
/// 可以带一个 profile 表达式，并挂载按 profile 选择的候选映射；
/// 求值前调用 [`ItemRuleMap::resolve`] 合并当前激活的候选。
#[derive(Debug, Clone, Default)]
pub struct ItemRuleMap {
    rules: IndexMap<String, ItemRule>,
    profile: Option<String>,
    candidates: Vec<ItemRuleMap>,
}

impl ItemRuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入项规则；自动命名的项按当前位置命名为 `item#N`
    pub fn put_item_rule(&mut self, mut rule: ItemRule) {
        if rule.auto_named || rule.name.is_empty() {
            rule.name = format!("{}{}", AUTO_NAME_PREFIX, self.rules.len());
            rule.auto_named = true;
        }
        self.rules.insert(rule.name.clone(), rule);
    }

    /// 链式放入
    pub fn with(mut self, rule: ItemRule) -> Self {
        self.put_item_rule(rule);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ItemRule> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemRule> {
        self.rules.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn set_profile(&mut self, profile: impl Into<String>) {
        self.profile = Some(profile.into());
    }

    pub fn add_candidate(&mut self, candidate: ItemRuleMap) {
        self.candidates.push(candidate);
    }

    pub fn candidates(&self) -> &[ItemRuleMap] {
        &self.candidates
    }

    /// 按当前激活的 profile 合并候选映射
    ///
    /// 匹配的候选按挂载顺序覆盖同名项；没有候选匹配时直接借用自身。
    pub fn resolve(&self, env: &Environment) -> Cow<'_, ItemRuleMap> {
        let mut matched = self
            .candidates
            .iter()
            .filter(|c| c.profile.as_deref().map_or(true, |p| env.matches_profiles(p)))
            .peekable();
        if matched.peek().is_none() {
            return Cow::Borrowed(self);
        }
        let mut merged = ItemRuleMap {
            rules: self.rules.clone(),
            profile: self.profile.clone(),
            candidates: Vec::new(),
        };
        for candidate in matched {
            for rule in candidate.rules.values() {
                merged.rules.insert(rule.name.clone(), rule.clone());
            }
        }
        Cow::Owned(merged)
    }
}

impl<'a> IntoIterator for &'a ItemRuleMap {
    type Item = &'a ItemRule;
    type IntoIter = indexmap::map::Values<'a, String, ItemRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.values()
    }
}

impl FromIterator<ItemRule> for ItemRuleMap {
    fn from_iter<I: IntoIterator<Item = ItemRule>>(iter: I) -> Self {
        let mut map = ItemRuleMap::new();
        for rule in iter {
            map.put_item_rule(rule);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    #[test]
    fn test_literal_value_round_trip() {
        for text in ["plain text", "", "  spaced  ", "with {braces} and $ sign", "multi\nline"] {
            let mut rule = ItemRule::new("msg");
            rule.set_value(text).unwrap();
            assert_eq!(rule.value().as_deref(), Some(text));
        }
    }

    #[test]
    fn test_tokenized_value() {
        let mut rule = ItemRule::new("greeting");
        rule.set_value("Hello, ${name:guest}!").unwrap();
        let tokens = rule.tokens().unwrap().unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].token_type(), TokenType::Parameter);
        assert_eq!(rule.value().as_deref(), Some("Hello, ${name:guest}!"));
        assert!(rule.contains_token(&Token::new(TokenType::Parameter, "name").with_default("guest")));
    }

    #[test]
    fn test_untokenized_value_keeps_symbols() {
        let mut rule = ItemRule::new("raw");
        rule.set_tokenize(false);
        rule.set_value("${not.a.token}").unwrap();
        let tokens = rule.tokens().unwrap().unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_text());
    }

    #[test]
    fn test_name_suffix_sets_type() {
        let rule = ItemRule::new("ids[]");
        assert_eq!(rule.name(), "ids");
        assert_eq!(rule.item_type(), ItemType::Array);
        let rule = ItemRule::new("opts{}");
        assert_eq!(rule.item_type(), ItemType::Map);
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let mut rule = ItemRule::new("ids[]");
        assert!(matches!(rule.set_value("x"), Err(RuleError::IllegalArgument(_))));
        rule.add_value("1").unwrap();
        rule.add_value("2").unwrap();
        assert_eq!(rule.value_list(), Some(vec!["1".to_string(), "2".to_string()]));
        assert!(matches!(rule.tokens(), Err(RuleError::IllegalState(_))));
        assert!(matches!(rule.tokens_map(), Err(RuleError::IllegalState(_))));

        let mut single = ItemRule::new("one");
        assert!(single.put_value("k", "v").is_err());
        assert!(single.tokens().unwrap().is_none());
    }

    #[test]
    fn test_new_instance_rejects_unknown_type() {
        let err = ItemRule::new_instance(Some("tuple"), Some("x"), None, None, None, None).unwrap_err();
        assert_eq!(err, RuleError::IllegalRule("No item type for 'tuple'".to_string()));
        let rule = ItemRule::new_instance(Some("list"), None, Some("int"), None, Some(true), None).unwrap();
        assert!(rule.is_auto_named());
        assert!(rule.is_mandatory());
        assert_eq!(rule.value_type(), Some(ItemValueType::Int));
    }

    #[test]
    fn test_auto_naming_in_map() {
        let first = ItemRule::new_instance(None, None, None, None, None, None).unwrap();
        let second = ItemRule::new_instance(None, None, None, None, None, None).unwrap();
        let map: ItemRuleMap = vec![first, second].into_iter().collect();
        let names: Vec<_> = map.names().collect();
        assert_eq!(names, vec!["item#0", "item#1"]);
    }

    #[test]
    fn test_prototype_type() {
        let mut rule = ItemRule::single("n", "1");
        assert_eq!(rule.prototype_type(&Value::from("1")), ValueType::String);
        rule.set_value_type(ItemValueType::Int);
        assert_eq!(rule.prototype_type(&Value::Int(1)), ValueType::Int);
        assert_eq!(ItemRule::new("ids[]").prototype_type(&Value::Null), ValueType::List);
    }

    #[test]
    fn test_secret_is_masked() {
        let mut rule = ItemRule::single("password", "hunter2");
        rule.set_secret(true);
        let text = rule.to_string();
        assert!(text.contains("value=****"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn test_resolve_by_profile() {
        let env = Environment::new();
        env.set_active_profiles(vec!["dev".to_string()]);

        let mut map = ItemRuleMap::new().with(ItemRule::single("url", "prod-url"));
        let mut dev = ItemRuleMap::new().with(ItemRule::single("url", "dev-url"));
        dev.set_profile("dev");
        let mut test = ItemRuleMap::new().with(ItemRule::single("url", "test-url"));
        test.set_profile("test");
        map.add_candidate(dev);
        map.add_candidate(test);

        let resolved = map.resolve(&env);
        assert_eq!(resolved.get("url").and_then(ItemRule::value).as_deref(), Some("dev-url"));

        env.set_active_profiles(vec!["prod".to_string()]);
        assert!(matches!(map.resolve(&env), Cow::Borrowed(_)));
    }
}
