use analysis_core::{AnalysisMode, AnalysisRequest};

/// Build the provider prompt for one request.
///
/// Every provider in the chain receives the same instruction block, so the
/// extractor can assume one wire shape regardless of which provider answers.
pub fn build(request: &AnalysisRequest) -> String {
    let depth_line = match request.mode {
        Some(AnalysisMode::Deep) => {
            "Give four or five impact points and weigh second-order effects.\n"
        }
        _ => "Give two or three concise impact points.\n",
    };

    let language_line = match request.language.as_deref() {
        Some(lang) => format!("Write all field values in {}.\n", lang),
        None => String::new(),
    };

    format!(
        "You are a market analyst. Analyze the news or question below and \
         respond with a single JSON object and nothing else, using exactly \
         these fields: \"summary_text\" (one or two sentences), \
         \"impact_points\" (a list of 2-5 short strings), \"action\" (one of \
         BUY, HOLD, SELL, WATCH), \"risk_level\" (one of Low, Medium, High).\n\
         {}{}\nInput: {}",
        depth_line, language_line, request.text
    )
}
