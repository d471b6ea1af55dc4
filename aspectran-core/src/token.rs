//! 令牌（Token）
//!
//! 项（Item）的字符串值可以内嵌动态引用：
//!
//! | 符号 | 类型 | 示例 |
//! |------|------|------|
//! | `$` | 请求参数 | `${name}`、`${name:guest}` |
//! | `@` | 请求属性 | `@{order^id}` |
//! | `#` | Bean | `#{orderService}` |
//! | `%` | 环境属性 | `%{app.title}` |
//! | `~` | 模板 | `~{header}` |
//!
//! `:` 之后为默认值，`^` 之后为取值的属性名（getter）。

use std::fmt;

pub const BEAN_SYMBOL: char = '#';
pub const TEMPLATE_SYMBOL: char = '~';
pub const PARAMETER_SYMBOL: char = '$';
pub const ATTRIBUTE_SYMBOL: char = '@';
pub const PROPERTY_SYMBOL: char = '%';
pub const BRACKET_OPEN: char = '{';
pub const BRACKET_CLOSE: char = '}';
pub const VALUE_DELIMITER: char = ':';
pub const GETTER_DELIMITER: char = '^';

/// 令牌名称的最大长度，超出时整个片段按普通文本处理
const MAX_TOKEN_NAME_LENGTH: usize = 256;

/// 令牌类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Text,
    Bean,
    Template,
    Parameter,
    Attribute,
    Property,
}

impl TokenType {
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            BEAN_SYMBOL => Some(TokenType::Bean),
            TEMPLATE_SYMBOL => Some(TokenType::Template),
            PARAMETER_SYMBOL => Some(TokenType::Parameter),
            ATTRIBUTE_SYMBOL => Some(TokenType::Attribute),
            PROPERTY_SYMBOL => Some(TokenType::Property),
            _ => None,
        }
    }

    pub fn symbol(&self) -> Option<char> {
        match self {
            TokenType::Text => None,
            TokenType::Bean => Some(BEAN_SYMBOL),
            TokenType::Template => Some(TEMPLATE_SYMBOL),
            TokenType::Parameter => Some(PARAMETER_SYMBOL),
            TokenType::Attribute => Some(ATTRIBUTE_SYMBOL),
            TokenType::Property => Some(PROPERTY_SYMBOL),
        }
    }
}

/// 令牌
///
/// 文本令牌的内容保存在 `default_value` 中。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    token_type: TokenType,
    name: Option<String>,
    getter_name: Option<String>,
    default_value: Option<String>,
}

impl Token {
    /// 文本令牌
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            token_type: TokenType::Text,
            name: None,
            getter_name: None,
            default_value: Some(text.into()),
        }
    }

    /// 引用令牌
    pub fn new(token_type: TokenType, name: impl Into<String>) -> Self {
        Self {
            token_type,
            name: Some(name.into()),
            getter_name: None,
            default_value: None,
        }
    }

    pub fn with_getter(mut self, getter_name: impl Into<String>) -> Self {
        self.getter_name = Some(getter_name.into());
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn getter_name(&self) -> Option<&str> {
        self.getter_name.as_deref()
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    pub fn is_text(&self) -> bool {
        self.token_type == TokenType::Text
    }

    pub fn is_token_symbol(c: char) -> bool {
        TokenType::from_symbol(c).is_some()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(symbol) = self.token_type.symbol() else {
            return f.write_str(self.default_value.as_deref().unwrap_or_default());
        };
        write!(f, "{}{}", symbol, BRACKET_OPEN)?;
        if let Some(name) = &self.name {
            f.write_str(name)?;
        }
        if let Some(getter) = &self.getter_name {
            write!(f, "{}{}", GETTER_DELIMITER, getter)?;
        }
        if let Some(value) = &self.default_value {
            write!(f, "{}{}", VALUE_DELIMITER, value)?;
        }
        write!(f, "{}", BRACKET_CLOSE)
    }
}

/// 将令牌序列还原成字符串
pub fn stringify(tokens: &[Token]) -> String {
    tokens.iter().map(ToString::to_string).collect()
}

/// 令牌序列中是否只有文本
pub fn is_literal(tokens: &[Token]) -> bool {
    tokens.iter().all(Token::is_text)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    Symbol,
    Name,
    Value,
}

/// 字符串分词器
pub struct Tokenizer;

impl Tokenizer {
    /// 将字符串拆分成令牌序列
    ///
    /// `trim` 为 `true` 时去掉文本令牌首尾的空白，但保留一个首尾换行符。
    /// 空字符串得到单个空文本令牌。
    pub fn tokenize(input: &str, trim: bool) -> Vec<Token> {
        let chars: Vec<char> = input.chars().collect();
        if chars.is_empty() {
            return vec![Token::text("")];
        }

        let mut tokens = Vec::new();
        let mut name = String::new();
        let mut value = String::new();
        let mut start = 0;
        let mut symbol_start = 0;
        let mut symbol = PARAMETER_SYMBOL;
        let mut state = State::Text;

        for (i, &c) in chars.iter().enumerate() {
            let end = i + 1;
            match state {
                State::Text => {
                    if Token::is_token_symbol(c) {
                        symbol = c;
                        symbol_start = i;
                        state = State::Symbol;
                    }
                }
                State::Symbol => {
                    if c == BRACKET_OPEN {
                        name.clear();
                        state = State::Name;
                    } else if Token::is_token_symbol(c) {
                        symbol = c;
                        symbol_start = i;
                    } else {
                        state = State::Text;
                    }
                }
                State::Name => {
                    if c == VALUE_DELIMITER {
                        value.clear();
                        state = State::Value;
                    } else if c == BRACKET_CLOSE {
                        if !name.is_empty() {
                            if symbol_start > start {
                                tokens.push(Token::text(extract(&chars[start..symbol_start], trim)));
                            }
                            tokens.push(create_token(symbol, &name, None));
                            start = end;
                        }
                        state = State::Text;
                    } else {
                        name.push(c);
                        if name.chars().count() > MAX_TOKEN_NAME_LENGTH {
                            name.clear();
                            state = State::Text;
                        }
                    }
                }
                State::Value => {
                    if c == BRACKET_CLOSE {
                        if !value.is_empty() {
                            if symbol_start > start {
                                tokens.push(Token::text(extract(&chars[start..symbol_start], trim)));
                            }
                            tokens.push(create_token(symbol, &name, Some(&value)));
                            start = end;
                        }
                        state = State::Text;
                    } else {
                        value.push(c);
                    }
                }
            }
        }

        if start < chars.len() {
            tokens.push(Token::text(extract(&chars[start..], trim)));
        }
        tokens
    }
}

fn create_token(symbol: char, name: &str, value: Option<&str>) -> Token {
    let Some(token_type) = TokenType::from_symbol(symbol) else {
        return Token::text(value.unwrap_or_default());
    };
    let mut token = match name.split_once(GETTER_DELIMITER) {
        Some((name, getter)) if !getter.is_empty() => Token::new(token_type, name).with_getter(getter),
        Some((name, _)) => Token::new(token_type, name),
        None => Token::new(token_type, name),
    };
    if let Some(value) = value {
        token = token.with_default(value);
    }
    token
}

fn extract(chars: &[char], trim: bool) -> String {
    if !trim {
        return chars.iter().collect();
    }

    let is_lf = |c: &char| *c == '\n' || *c == '\r';
    let leading_lf = chars
        .iter()
        .take_while(|c| c.is_whitespace())
        .any(is_lf);
    let trailing_lf = chars
        .iter()
        .rev()
        .take_while(|c| c.is_whitespace())
        .any(is_lf);

    let text: String = chars.iter().collect();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return if leading_lf || trailing_lf {
            "\n".to_string()
        } else {
            String::new()
        };
    }
    match (leading_lf, trailing_lf) {
        (true, true) => format!("\n{}\n", trimmed),
        (true, false) => format!("\n{}", trimmed),
        (false, true) => format!("{}\n", trimmed),
        (false, false) => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_mixed() {
        let tokens = Tokenizer::tokenize("Hello, ${name:guest}! @{order^id}", false);
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0], Token::text("Hello, "));
        assert_eq!(tokens[1], Token::new(TokenType::Parameter, "name").with_default("guest"));
        assert_eq!(tokens[2], Token::text("! "));
        assert_eq!(tokens[3], Token::new(TokenType::Attribute, "order").with_getter("id"));
    }

    #[test]
    fn test_literal_round_trip() {
        for input in ["plain text", "cost: $5", "#hash {braces}", "${}", "", "  spaced  "] {
            let tokens = Tokenizer::tokenize(input, false);
            assert!(is_literal(&tokens), "{input}");
            assert_eq!(stringify(&tokens), input);
        }
    }

    #[test]
    fn test_token_round_trip() {
        let input = "a ${p} b #{bean^prop:x} %{app.name}";
        assert_eq!(stringify(&Tokenizer::tokenize(input, false)), input);
    }

    #[test]
    fn test_trim_keeps_newlines() {
        let tokens = Tokenizer::tokenize("\n   hello  \n", true);
        assert_eq!(tokens, vec![Token::text("\nhello\n")]);
        let tokens = Tokenizer::tokenize("  hello ", true);
        assert_eq!(tokens, vec![Token::text("hello")]);
    }

    #[test]
    fn test_overlong_name_is_text() {
        let input = format!("${{{}}}", "x".repeat(MAX_TOKEN_NAME_LENGTH + 1));
        let tokens = Tokenizer::tokenize(&input, false);
        assert!(is_literal(&tokens));
    }
}
