//! 应答规范化：两段式把生成文本转为结构化应答
//!
//! 1. 文本清洗：去掉 Markdown 标记与 `【12†source】` 形式的行内引用标记
//! 2. 结构化抽取：用函数调用把清洗后的文本重新表达为 StructuredAnswer，并校验必填字段

use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::backend::{StructuredGenerator, StructuredSchema};
use crate::error::ChatError;

pub const ANSWER_FUNCTION_NAME: &str = "give_answer_with_image";
const ANSWER_FUNCTION_DESCRIPTION: &str =
    "Provide a response with a support image and url or cite references";
const ANSWER_INSTRUCTION: &str = "You are a helpful assistant. Parse the content into json";

/// 结构化应答（同时作为函数调用参数的 Schema 来源）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StructuredAnswer {
    /// The answer text
    pub response: String,
    /// References of the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<String>>,
    /// Array of image URLs. Can contain multiple images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_images: Option<Vec<String>>,
}

/// 抽取函数的描述与参数 Schema
pub fn answer_schema() -> StructuredSchema {
    let gen = SchemaSettings::draft07()
        .with(|s| {
            s.meta_schema = None;
            s.inline_subschemas = true;
            s.option_add_null_type = false;
        })
        .into_generator();
    let root = gen.into_root_schema_for::<StructuredAnswer>();
    StructuredSchema {
        name: ANSWER_FUNCTION_NAME.to_string(),
        description: ANSWER_FUNCTION_DESCRIPTION.to_string(),
        instruction: ANSWER_INSTRUCTION.to_string(),
        parameters: serde_json::to_value(&root).unwrap_or_default(),
    }
}

static CITATION_RE: OnceLock<Regex> = OnceLock::new();

/// 去掉 `【12†source】` / `【4:0†source】` 形式的引用标记
pub fn strip_citations(text: &str) -> String {
    let re = CITATION_RE.get_or_init(|| Regex::new(r"【\d+(?::\d+)?†[^】]*】").unwrap());
    re.replace_all(text, "").into_owned()
}

struct MarkdownRules {
    fence: Regex,
    html_tag: Regex,
    horizontal_rule: Regex,
    setext: Regex,
    atx_open: Regex,
    atx_close: Regex,
    blockquote: Regex,
    list_marker: Regex,
    footnote: Regex,
    link_definition: Regex,
    image: Regex,
    inline_link: Regex,
    reference_link: Regex,
    strike: Regex,
    asterisk: Regex,
    underscore: Regex,
    inline_code: Regex,
    blank_lines: Regex,
}

static MARKDOWN_RULES: OnceLock<MarkdownRules> = OnceLock::new();

fn markdown_rules() -> &'static MarkdownRules {
    MARKDOWN_RULES.get_or_init(|| MarkdownRules {
        fence: Regex::new(r"(?m)^[ \t]*(?:```|~~~).*\n?").unwrap(),
        html_tag: Regex::new(r"</?[A-Za-z][^>\n]*>").unwrap(),
        horizontal_rule: Regex::new(r"(?m)^[ \t]*(?:[-*_][ \t]*){3,}$").unwrap(),
        setext: Regex::new(r"(?m)^[ \t]*={2,}[ \t]*$").unwrap(),
        atx_open: Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+").unwrap(),
        atx_close: Regex::new(r"(?m)[ \t]+#{1,6}[ \t]*$").unwrap(),
        blockquote: Regex::new(r"(?m)^[ \t]{0,3}(?:>[ \t]?)+").unwrap(),
        list_marker: Regex::new(r"(?m)^([ \t]*)(?:[*+-]|\d+[.)])[ \t]+").unwrap(),
        footnote: Regex::new(r"(?m)\[\^[^\]]+\](?::[^\n]*$)?").unwrap(),
        link_definition: Regex::new(r"(?m)^[ \t]{0,3}\[[^\]]+\]:[ \t]+\S.*$").unwrap(),
        image: Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)[^)]*\)").unwrap(),
        inline_link: Regex::new(r"\[([^\]]*)\]\(([^)\s]+)[^)]*\)").unwrap(),
        reference_link: Regex::new(r"\[([^\]]+)\]\[[^\]]*\]").unwrap(),
        strike: Regex::new(r"~~([^~\n]+)~~").unwrap(),
        asterisk: Regex::new(r"\*{1,3}([^*\n]+?)\*{1,3}").unwrap(),
        underscore: Regex::new(r"(^|[^\w])_{1,3}([^_\n]+?)_{1,3}([^\w]|$)").unwrap(),
        inline_code: Regex::new(r"`+([^`\n]+?)`+").unwrap(),
        blank_lines: Regex::new(r"\n{3,}").unwrap(),
    })
}

/// 链接 / 图片保留文字与 URL（URL 供结构化抽取识别引用与配图）
fn label_with_url(caps: &Captures) -> String {
    let label = caps[1].trim();
    let url = &caps[2];
    if label.is_empty() || label == url {
        url.to_string()
    } else {
        format!("{label} ({url})")
    }
}

/// 去掉 Markdown 标记，保留正文
pub fn strip_markdown(text: &str) -> String {
    let r = markdown_rules();
    let text = text.replace("\r\n", "\n");
    let text = r.fence.replace_all(&text, "");
    let text = r.html_tag.replace_all(&text, "");
    let text = r.horizontal_rule.replace_all(&text, "");
    let text = r.setext.replace_all(&text, "");
    let text = r.atx_open.replace_all(&text, "");
    let text = r.atx_close.replace_all(&text, "");
    let text = r.blockquote.replace_all(&text, "");
    let text = r.list_marker.replace_all(&text, "${1}");
    let text = r.footnote.replace_all(&text, "");
    let text = r.link_definition.replace_all(&text, "");
    let text = r.image.replace_all(&text, label_with_url);
    let text = r.inline_link.replace_all(&text, label_with_url);
    let text = r.reference_link.replace_all(&text, "${1}");
    let text = r.strike.replace_all(&text, "${1}");
    let text = r.asterisk.replace_all(&text, "${1}");
    let text = r.underscore.replace_all(&text, "${1}${2}${3}");
    let text = r.inline_code.replace_all(&text, "${1}");
    let text = r.blank_lines.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// 第一阶段：Markdown 去除 + 引用标记去除
pub fn clean_text(raw: &str) -> String {
    strip_citations(&strip_markdown(raw))
}

/// 解析并校验抽取结果：JSON 无效或 response 缺失 / 为空均视为格式错误
pub fn parse_structured(raw: &str) -> Result<StructuredAnswer, ChatError> {
    let answer: StructuredAnswer = serde_json::from_str(raw)
        .map_err(|e| ChatError::MalformedStructuredResponse(e.to_string()))?;
    if answer.response.trim().is_empty() {
        return Err(ChatError::MalformedStructuredResponse(
            "`response` field is empty".to_string(),
        ));
    }
    Ok(answer)
}

/// 规范化器：持有结构化生成能力与固定 Schema；本阶段不重试
pub struct ResponseNormalizer {
    generator: Arc<dyn StructuredGenerator>,
    schema: StructuredSchema,
}

impl ResponseNormalizer {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self {
            generator,
            schema: answer_schema(),
        }
    }

    pub async fn normalize(&self, raw: &str) -> Result<StructuredAnswer, ChatError> {
        let cleaned = clean_text(raw);
        tracing::debug!(
            raw_chars = raw.chars().count(),
            cleaned_chars = cleaned.chars().count(),
            "cleaned generated text"
        );
        let json = self
            .generator
            .generate_structured(&self.schema, &cleaned)
            .await?;
        parse_structured(&json)
    }
}
