//! Prompt context assembly

use crate::intent::QueryCategory;
use crate::market::LookupOutcome;
use crate::retrieval::RetrievalHit;
use chrono::{DateTime, Utc};

/// Characters of each hit quoted into the prompt
pub const HIT_PREVIEW_CHARS: usize = 300;

const RULE: &str = "============================================================";

pub const NO_STRUCTURED_DATA: &str = "Không có dữ liệu số học cụ thể.";
pub const NO_UNSTRUCTURED_DATA: &str = "Không có phân tích/tin tức liên quan.";

/// Structured section: the rendered lookup, or nothing when no lookup ran
pub fn structured_section(outcome: Option<&LookupOutcome>) -> String {
    let Some(outcome) = outcome else {
        return String::new();
    };
    match outcome {
        LookupOutcome::Success { .. } => outcome.render(),
        LookupOutcome::NoData { message, suggestion } => format!(
            "**KHÔNG CÓ DỮ LIỆU TRONG DATABASE**\n\n{}\nGợi ý: {}",
            message, suggestion
        ),
        LookupOutcome::Error { message } => format!("Lỗi: {}", message),
    }
}

/// Numbered list of hits, each prefixed with its date when known
pub fn unstructured_section(hits: &[RetrievalHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(idx, hit)| {
            let preview: String = hit.text.chars().take(HIT_PREVIEW_CHARS).collect();
            match hit.date() {
                Some(date) => format!("{}. [{}] {}...", idx + 1, date, preview),
                None => format!("{}. {}...", idx + 1, preview),
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Both sections, structured facts first
pub fn build_context(structured: &str, unstructured: &str) -> String {
    let or = |section: &str, fallback: &'static str| {
        if section.trim().is_empty() {
            fallback.to_string()
        } else {
            section.to_string()
        }
    };

    format!(
        "{rule}\nSTRUCTURED DATA (Facts from Database - Priority #1):\n{rule}\n{}\n\n\
         {rule}\nUNSTRUCTURED DATA (Context & Analysis - Priority #2):\n{rule}\n{}",
        or(structured, NO_STRUCTURED_DATA),
        or(unstructured, NO_UNSTRUCTURED_DATA),
        rule = RULE,
    )
}

/// The message actually sent for the current turn
pub fn user_turn(context: &str, message: &str) -> String {
    format!("{}\n\n**Câu hỏi:** {}", context, message)
}

pub fn system_prompt(now: DateTime<Utc>, category: QueryCategory) -> String {
    format!(
        "Bạn là CryptoAI Assistant - Chuyên gia phân tích tiền điện tử.\n\
         **Ngày giờ hiện tại:** {now}\n\
         \n\
         NHIỆM VỤ:\n\
         1. **Trả lời chính xác** các câu hỏi về giá/volume dựa trên STRUCTURED DATA\n\
         2. **Phân tích xu hướng** dựa trên UNSTRUCTURED DATA (tin tức, sentiment)\n\
         3. **Kết hợp 2 nguồn** để đưa ra nhận định toàn diện\n\
         4. **Trung thực:** Nếu không có dữ liệu, nói rõ \"Không có dữ liệu\"\n\
         \n\
         QUY TẮC HIỂN THỊ:\n\
         1. Công thức inline dùng $...$, công thức riêng dòng dùng $$...$$.\n\
         2. Không dùng \\( \\) hay \\[ \\].\n\
         3. Trình bày bảng biểu rõ ràng, in đậm các con số quan trọng.\n\
         \n\
         **INTENT DETECTED:** {category}",
        now = now.format("%d/%m/%Y %H:%M"),
        category = category.as_str().to_uppercase(),
    )
}
