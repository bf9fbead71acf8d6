/*!
 * Prompt templates for term generation.
 *
 * The generation prompt asks the provider for a JSON array of objects with
 * `english`, `chinese`, `pinyin` and `sentence` fields.
 */

/// Prompt used for the one-off authentication probe
pub const AUTH_PROBE_PROMPT: &str = "Hello";

/// Output token cap for the authentication probe
pub const AUTH_PROBE_MAX_TOKENS: u32 = 16;

const TERM_GENERATION_TEMPLATE: &str = r#"Generate {count} English words related to the topic "{topic}" along with their Chinese (Simplified) translations, pinyin pronunciation, and example sentences.{context}

Requirements:
1. Words should be commonly used and appropriate for language learning
2. Each word should be a single word or simple phrase (no complex sentences)
3. Chinese translations should use Simplified Chinese characters
4. Provide accurate pinyin pronunciation with tone numbers (e.g., "mao1" for 猫)
5. Provide the most common and accurate translation for each word
6. Include an example sentence in English, Chinese and pinyin, separated by <br>
7. Words should be suitable for flashcard learning

Format your response as a JSON array with this exact structure:
[
    {"english": "word1", "chinese": "中文1", "pinyin": "pinyin1", "sentence": "Example sentence using word1.<br>使用中文1的简单中文句子。<br>Pinyin version of the Chinese sentence."},
    ...
]

Topic: {topic}
Number of words: {count}

JSON Response:"#;

const TRANSLATION_TEMPLATE: &str = r#"Translate the English word "{word}" to Chinese (Simplified).

Provide only the Chinese translation, no additional text or explanation.
The translation should be the most common and appropriate Chinese equivalent.

English word: {word}
Chinese translation:"#;

/// Build the term generation prompt
pub fn term_generation_prompt(topic: &str, count: usize, context: Option<&str>) -> String {
    let context_block = match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!(
            "\n\nAdditional Context: {}\nPlease consider this context when selecting words and creating sentences.",
            context
        ),
        None => String::new(),
    };

    let count = count.to_string();
    fill_template(
        TERM_GENERATION_TEMPLATE,
        &[
            ("{count}", count.as_str()),
            ("{topic}", topic.trim()),
            ("{context}", context_block.as_str()),
        ],
    )
}

/// Build the single-word translation prompt
pub fn translation_prompt(word: &str) -> String {
    fill_template(TRANSLATION_TEMPLATE, &[("{word}", word.trim())])
}

/// Substitute placeholders in a single pass
///
/// Substituted values are never scanned again, so user text containing a
/// placeholder is kept verbatim.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match values.iter().find(|(placeholder, _)| tail.starts_with(placeholder)) {
            Some((placeholder, value)) => {
                out.push_str(value);
                rest = &tail[placeholder.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Remove an optional markdown code fence around a response
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
