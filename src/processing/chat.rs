//! Grounded prompts and fallbacks for document chat.

use super::types::ChatSource;
use crate::vector::SearchHit;

const SOURCE_EXCERPT_CHARS: usize = 200;
const FALLBACK_EXCERPT_CHARS: usize = 300;

/// Answer returned when retrieval finds nothing.
pub fn no_context_answer(pdf_name: Option<&str>) -> String {
    match pdf_name {
        Some(name) => format!(
            "Não encontrei informações relevantes no PDF '{name}' para responder sua pergunta. \
             Você poderia reformular ou fazer uma pergunta mais específica?"
        ),
        None => "Não encontrei informações relevantes nos seus documentos para responder essa \
                 pergunta. Você poderia especificar um PDF ou fazer uma pergunta mais detalhada?"
            .to_string(),
    }
}

/// Prompt asking the model to answer `question` from `hits` only.
pub fn grounded_prompt(question: &str, pdf_name: Option<&str>, hits: &[SearchHit]) -> String {
    let context = hits
        .iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    match pdf_name {
        Some(name) => format!(
            "Com base no seguinte contexto extraído do documento '{name}', responda à pergunta \
             de forma clara e detalhada.\n\nCONTEXTO:\n{context}\n\nPERGUNTA: {question}\n\nRESPOSTA:"
        ),
        None => format!(
            "Com base no seguinte contexto extraído dos documentos do usuário, responda à pergunta \
             de forma clara e detalhada.\n\nCONTEXTO DOS DOCUMENTOS:\n{context}\n\n\
             PERGUNTA: {question}\n\nINSTRUÇÕES:\n\
             - Use apenas as informações do contexto fornecido\n\
             - Se a informação não estiver no contexto, diga que não encontrou dados suficientes\n\
             - Cite os documentos relevantes quando possível\n\
             - Não invente informações\n\
             - Responda de forma direta e objetiva\n\nRESPOSTA:"
        ),
    }
}

/// Answer built from the first retrieved chunks when the model fails.
pub fn fallback_answer(question: &str, hits: &[SearchHit]) -> String {
    let mut answer =
        format!("Encontrei informações relevantes sobre '{question}' nos documentos:\n\n");
    for (position, hit) in hits.iter().take(2).enumerate() {
        answer.push_str(&format!(
            "{}. {}...\n\n",
            position + 1,
            excerpt(&hit.text, FALLBACK_EXCERPT_CHARS)
        ));
    }
    answer.push_str("Baseado nessas informações dos documentos indexados.");
    answer
}

/// Citation for each retrieved chunk.
pub fn sources(hits: &[SearchHit], default_pdf: Option<&str>) -> Vec<ChatSource> {
    hits.iter()
        .map(|hit| ChatSource {
            text: format!("{}...", excerpt(&hit.text, SOURCE_EXCERPT_CHARS)),
            pdf_name: hit
                .metadata
                .get("pdf_name")
                .and_then(|value| value.as_str())
                .or(default_pdf)
                .unwrap_or("Unknown")
                .to_string(),
            chunk_index: hit
                .metadata
                .get("chunk_index")
                .and_then(|value| value.as_u64())
                .unwrap_or(0),
            similarity_score: hit.score,
        })
        .collect()
}

fn excerpt(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    fn hit(text: &str, pdf: &str, index: u64) -> SearchHit {
        let mut metadata = Map::new();
        metadata.insert("pdf_name".into(), Value::from(pdf));
        metadata.insert("chunk_index".into(), Value::from(index));
        SearchHit {
            text: text.into(),
            metadata,
            score: 0.8,
            id: format!("{pdf}_chunk_{index}"),
        }
    }

    #[test]
    fn document_prompt_embeds_context_and_question() {
        let hits = vec![
            hit("Valor total: R$ 10.000", "c.pdf", 0),
            hit("Prazo: 12 meses", "c.pdf", 1),
        ];
        let prompt = grounded_prompt("Qual o valor?", Some("c.pdf"), &hits);
        assert!(prompt.contains("documento 'c.pdf'"));
        assert!(prompt.contains("Valor total: R$ 10.000\n\nPrazo: 12 meses"));
        assert!(prompt.ends_with("PERGUNTA: Qual o valor?\n\nRESPOSTA:"));
    }

    #[test]
    fn sources_truncate_on_char_boundaries() {
        let long = "ç".repeat(250);
        let cited = sources(&[hit(&long, "c.pdf", 3)], None);
        assert_eq!(cited[0].text.chars().count(), 203);
        assert_eq!(cited[0].chunk_index, 3);
        assert_eq!(cited[0].pdf_name, "c.pdf");
    }

    #[test]
    fn fallback_quotes_at_most_two_chunks() {
        let hits = vec![hit("um", "a.pdf", 0), hit("dois", "a.pdf", 1), hit("três", "a.pdf", 2)];
        let answer = fallback_answer("prazo", &hits);
        assert!(answer.contains("1. um..."));
        assert!(answer.contains("2. dois..."));
        assert!(!answer.contains("três"));
    }
}
