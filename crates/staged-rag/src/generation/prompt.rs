//! Prompt templates for the analyze, draft, critique, and refine stages

/// Context text used when retrieval found nothing
pub const NO_SOURCES: &str = "No relevant source material was found.";

/// Instruction every draft carries so answers stay tied to the sources
pub const GROUNDING_RULE: &str = "If the sources do not contain what the query asks for, say so plainly and do not invent content.";

/// Appended to the knowledge base's system prompt for the refine stage
pub const REFINE_INSTRUCTION: &str = "Improve the draft based on the critique provided.";

/// Knowledge base flavour, selecting the tone of the analyze and draft prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KbProfile {
    Resumes,
    ApiDocs,
    Recipes,
    Supplements,
}

impl KbProfile {
    /// Pick the profile for a knowledge base name; unknown names use the
    /// supplements profile.
    pub fn from_kb(kb: &str) -> Self {
        match kb {
            "resumes" => Self::Resumes,
            "api_docs" => Self::ApiDocs,
            "recipes" => Self::Recipes,
            _ => Self::Supplements,
        }
    }

    /// System prompt for the draft stage
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Resumes => {
                "You are an expert HR consultant who matches resumes to job descriptions.\n\
                 Analyze the resume information and the job query to provide a detailed matching analysis.\n\
                 Focus on relevant skills, experience, and qualifications that match or do not match the job requirements."
            }
            Self::ApiDocs => {
                "You are an expert API documentation consultant.\n\
                 Provide clear, accurate answers to questions about APIs based on the documentation.\n\
                 Include code examples where relevant and explain parameters, endpoints, and authentication methods."
            }
            Self::Recipes => {
                "You are a creative culinary expert.\n\
                 Enhance recipes with suggestions, variations, and improvements.\n\
                 Provide nutritional insights and answer cooking questions with practical advice."
            }
            Self::Supplements => {
                "You are a wellness advisor specializing in supplements and health optimization.\n\
                 Provide evidence-based advice about supplements, their ingredients, benefits, and usage.\n\
                 For product bundles, explain synergies between products and personalize recommendations.\n\
                 Always include appropriate health disclaimers and encourage consulting healthcare providers."
            }
        }
    }

    /// What the analyze stage should pull out of each chunk
    pub fn analysis_focus(&self) -> &'static str {
        match self {
            Self::Resumes => "skills, experience, education, and key qualifications",
            Self::ApiDocs => "endpoints, parameters, authentication methods, and examples",
            Self::Recipes => "ingredients, steps, nutritional info, and special tips",
            Self::Supplements => "benefits, ingredients, usage instructions, and health claims",
        }
    }
}

/// Prompt builder for the stage pipeline
pub struct PromptBuilder;

impl PromptBuilder {
    /// System prompt for the analyze stage
    pub const ANALYST_SYSTEM: &'static str = "You are an expert document parser and summarizer.\n\
        Your task is to analyze the provided text and extract the key information.\n\
        Return a concise summary with the most important information. Do not add facts that are not in the text.";

    /// System prompt for the critique stage
    pub const CRITIC_SYSTEM: &'static str = r#"You are an expert content evaluator. Critically examine the draft response and identify:
1. Factual inaccuracies or contradictions with the source material
2. Claims that are not supported by the sources
3. Missing information relevant to the query
4. Problems with clarity, coherence, or tone

The FIRST line of your reply must be exactly one verdict:
APPROVED - the draft needs no further changes
NEEDS IMPROVEMENT - the draft should be revised

After the verdict line, be specific in your critique to guide improvements."#;

    /// User prompt for summarizing one retrieved chunk
    pub fn analyze_prompt(profile: KbProfile, chunk_text: &str) -> String {
        format!(
            "Focus on {focus}.\n\nPlease analyze and summarize the following text:\n\n{text}",
            focus = profile.analysis_focus(),
            text = chunk_text
        )
    }

    /// Build the numbered context block from chunk summaries
    pub fn build_context(summaries: &[String]) -> String {
        if summaries.is_empty() {
            return NO_SOURCES.to_string();
        }

        let mut context = String::new();
        for (i, summary) in summaries.iter().enumerate() {
            context.push_str(&format!("Source {}:\n{}\n\n", i + 1, summary.trim()));
        }
        context.trim_end().to_string()
    }

    /// User prompt for the first draft
    pub fn draft_prompt(query: &str, context: &str) -> String {
        format!(
            r#"Context information:

{context}

GROUNDING RULE: {rule}

Query: {query}

Please provide a comprehensive response."#,
            context = context,
            rule = GROUNDING_RULE,
            query = query
        )
    }

    /// User prompt for evaluating a draft
    pub fn critique_prompt(query: &str, context: &str, draft: &str) -> String {
        format!(
            "Original query: {query}\n\nContext information:\n{context}\n\nDraft response:\n{draft}",
            query = query,
            context = context,
            draft = draft
        )
    }

    /// System prompt for the refine stage
    pub fn refine_system(profile: KbProfile) -> String {
        format!("{}\n\n{}", profile.system_prompt(), REFINE_INSTRUCTION)
    }

    /// User prompt for rewriting a draft with its critique
    pub fn refine_prompt(query: &str, context: &str, draft: &str, critique: &str) -> String {
        format!(
            r#"Original query: {query}

Context information:
{context}

GROUNDING RULE: {rule}

Draft response:
{draft}

Critique:
{critique}

Please provide an improved version that addresses the critique. Reply with the improved response only."#,
            query = query,
            context = context,
            rule = GROUNDING_RULE,
            draft = draft,
            critique = critique
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kb_falls_back_to_supplements() {
        assert_eq!(KbProfile::from_kb("recipes"), KbProfile::Recipes);
        assert_eq!(KbProfile::from_kb("api_docs"), KbProfile::ApiDocs);
        assert_eq!(KbProfile::from_kb("poetry"), KbProfile::Supplements);
    }

    #[test]
    fn test_context_numbering() {
        let context = PromptBuilder::build_context(&[
            "Oats soaked overnight.".to_string(),
            " Add berries. ".to_string(),
        ]);
        assert_eq!(context, "Source 1:\nOats soaked overnight.\n\nSource 2:\nAdd berries.");
    }

    #[test]
    fn test_empty_context() {
        assert_eq!(PromptBuilder::build_context(&[]), NO_SOURCES);
    }

    #[test]
    fn test_draft_prompt_carries_grounding_rule() {
        let prompt = PromptBuilder::draft_prompt("suggest a sandwich", "Source 1:\nOatmeal");
        assert!(prompt.contains(GROUNDING_RULE));
        assert!(prompt.contains("Query: suggest a sandwich"));
        assert!(prompt.contains("Source 1:\nOatmeal"));
    }

    #[test]
    fn test_refine_system_extends_profile() {
        let system = PromptBuilder::refine_system(KbProfile::Resumes);
        assert!(system.starts_with(KbProfile::Resumes.system_prompt()));
        assert!(system.ends_with(REFINE_INSTRUCTION));
    }

    #[test]
    fn test_critic_asks_for_verdict_first() {
        assert!(PromptBuilder::CRITIC_SYSTEM.contains("FIRST line"));
        assert!(PromptBuilder::CRITIC_SYSTEM.contains("APPROVED"));
        assert!(PromptBuilder::CRITIC_SYSTEM.contains("NEEDS IMPROVEMENT"));
    }
}
