//! Prompt builders for the planner and executor agents.
//!
//! Pure string construction: prompts are deterministic functions of their
//! inputs with no side effects.

/// Builds the planner prompt: explore the site and return a JSON test plan.
///
/// The agent is instructed to reply with only a JSON object of the shape
/// `{"test_cases": [string, ...]}`, no prose.
pub fn planner_prompt(website_url: &str) -> String {
    format!(
        r#"You are a senior QA engineer responsible for creating a test plan for the website: {website_url}.

Your task is to explore the website and generate a comprehensive list of test cases.

The output must be a JSON object containing a single key "test_cases".
The value of "test_cases" must be an array of strings.
Each string in the array should be a concise, descriptive name for a single test case.

Example:
{{
  "test_cases": [
    "Test user login with valid credentials.",
    "Test user login with invalid credentials.",
    "Test adding an item to the shopping cart.",
    "Test navigating to the 'About Us' page and verifying its content."
  ]
}}

Please provide only the JSON object as your response. Do not include any other text or explanations."#
    )
}

/// Builds the executor prompt: run exactly one test case and report a
/// verdict, with a templated bug report on failure.
pub fn executor_prompt(website_url: &str, test_case: &str) -> String {
    format!(
        r#"You are a meticulous QA test executor. Your sole task is to execute a single test case precisely as described and report the outcome.

**Website:** {website_url}
**Test Case to Execute:** {test_case}

**Instructions:**
1.  Follow the steps outlined in the test case.
2.  After execution, determine if the test case passed or failed.
3.  If it failed, provide a detailed bug report in markdown format, using exactly this template:

## Bug Report

**Bug Summary:** <one-line summary>

**Description:** <what went wrong>

**Steps to Reproduce:**
1. <step>
2. <step>

**Expected Result:** <expected behavior>

**Actual Result:** <observed behavior>

4.  Conclude your response with a single word: `PASS` or `FAIL`."#
    )
}

/// Builds the free-form exploratory prompt used when a run starts without
/// an explicit plan, folding in user-supplied custom instructions.
pub fn exploratory_prompt(website_url: &str, custom_instructions: &str) -> String {
    let instructions = if custom_instructions.trim().is_empty() {
        "Perform a general test of the website."
    } else {
        custom_instructions
    };

    format!(
        r#"You are a senior QA tester. Your goal is to test the website: {website_url}.

Please follow these instructions:
{instructions}

Your task is to identify bugs, usability issues, or any unexpected behavior.

Here are some rules to follow:
-   Do not get stuck in a loop. If you perform an action, try a different action next.
-   Your test should not exceed 8 steps.
-   Provide a summary of your findings at the end."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_prompt_requests_json_only() {
        let prompt = planner_prompt("https://demoblaze.com/");

        assert!(prompt.contains("https://demoblaze.com/"));
        assert!(prompt.contains("\"test_cases\""));
        assert!(prompt.contains("Please provide only the JSON object"));
    }

    #[test]
    fn test_executor_prompt_embeds_case_and_verdict_instruction() {
        let prompt = executor_prompt(
            "https://demoblaze.com/",
            "Test user login with valid credentials.",
        );

        assert!(prompt.contains("https://demoblaze.com/"));
        assert!(prompt.contains("Test user login with valid credentials."));
        assert!(prompt.ends_with("Conclude your response with a single word: `PASS` or `FAIL`."));
    }

    #[test]
    fn test_executor_prompt_includes_bug_template() {
        let prompt = executor_prompt("https://x.test/", "Check the footer links.");

        assert!(prompt.contains("## Bug Report"));
        assert!(prompt.contains("**Bug Summary:**"));
        assert!(prompt.contains("**Steps to Reproduce:**"));
        assert!(prompt.contains("**Expected Result:**"));
        assert!(prompt.contains("**Actual Result:**"));
    }

    #[test]
    fn test_exploratory_prompt_defaults_instructions() {
        let prompt = exploratory_prompt("https://x.test/", "   ");
        assert!(prompt.contains("Perform a general test of the website."));

        let prompt = exploratory_prompt("https://x.test/", "Focus on the cart.");
        assert!(prompt.contains("Focus on the cart."));
        assert!(!prompt.contains("Perform a general test"));
    }

    #[test]
    fn test_prompts_are_deterministic() {
        assert_eq!(planner_prompt("https://a.test/"), planner_prompt("https://a.test/"));
        assert_eq!(
            executor_prompt("https://a.test/", "case"),
            executor_prompt("https://a.test/", "case")
        );
    }
}
