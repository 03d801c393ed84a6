// Fit-analysis LLM prompt templates.
// All prompts for the analysis module are defined here.

use crate::models::application::{ApplicationRow, DocumentRow};

pub const FIT_ANALYSIS_SYSTEM: &str = "\
You are a rigorous hiring analyst. \
Compare a candidate's resume against a job description and produce a fit \
verdict. Respond in EXACTLY the delimited format you are given — no \
markdown fences, no preamble, no trailing commentary.";

pub const FIT_ANALYSIS_PROMPT_TEMPLATE: &str = r#"Assess how well the resume below fits the role.

ROLE: {role_title} at {company}

JOB DESCRIPTION:
{job_description}

RESUME:
{resume_text}

Respond in EXACTLY this format:

---SCORE---
<integer 0-100>
---RECOMMENDATION---
<one of: strong | moderate | weak | not_recommended>
---ANALYSIS---
<detailed markdown analysis: strengths, gaps, and concrete suggestions>
---END---
"#;

pub fn build_fit_prompt(application: &ApplicationRow, document: &DocumentRow) -> String {
    FIT_ANALYSIS_PROMPT_TEMPLATE
        .replace("{role_title}", &application.role_title)
        .replace("{company}", &application.company)
        .replace("{job_description}", &application.job_description)
        .replace("{resume_text}", &document.content_text)
}
