//! Prompt construction for contract analysis.

/// System message framing the analysis engine.
pub const SYSTEM_PROMPT: &str = "You are an expert in analyzing Clarity smart contracts for the \
Stacks blockchain and teaching developers who are new to Clarity how to write it well. Provide \
clear, technical analysis focusing on the contract's purpose and implementation details. Format \
your response as valid JSON with the specified fields.";

/// Tags the engine is asked to choose from.
pub const TAG_VOCABULARY: &[&str] = &[
    "NFT",
    "fungible-token",
    "DeFi",
    "DEX",
    "lending",
    "staking",
    "governance",
    "bridge",
    "oracle",
    "protocol",
    "utility",
    "game",
];

const INSTRUCTIONS: &str = r#"Analyze this Clarity smart contract and provide your response in the following JSON format:

{
  "summary": "short 1-2 sentence summary of what the contract does",
  "explanation": "Start with a high-level architectural overview, then walk through the code line-by-line:

  1. First list and explain all the contract's data vars and constants
  2. Then analyze each function in order of appearance, explaining:
     - The function's purpose and when it's called
     - Each parameter and its role
     - The exact logic/steps of what the function does
     - Any important safety checks or error conditions
     - How it interacts with other functions/contracts

  For EVERY code reference, use line number annotations:
  - Single line: <L42>
  - Multiple lines: <L15-20>

  Quote identifiers from the code in single quotes, e.g. 'transfer' or 'get-balance'.

  Example format:
  The contract defines a data variable 'total-supply' <L12> to track the total number of tokens.

  The 'transfer' function <L45-60> handles token transfers between accounts. It first checks if the sender has sufficient balance <L47>, then updates both accounts' balances <L52-53>...",

  Please make sure this analysis is very thorough, using language that a non-technical audience can understand.

  Finish the analysis by noting in a list any notable qualities or things that stand out about this contract which make it unique.

"#;

/// Prefix every line of `source` with its right-aligned 1-based number.
///
/// ```text
///    1  (define-constant owner tx-sender)
///    2  (define-data-var n uint u0)
/// ```
pub fn number_lines(source: &str) -> String {
    source
        .split('\n')
        .enumerate()
        .map(|(i, line)| format!("{:>4}  {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the user prompt for one contract.
pub fn build_prompt(source: &str) -> String {
    let tags = TAG_VOCABULARY.join(", ");
    format!(
        "{INSTRUCTIONS}  \"tags\": [\"Pick 2-4 tags that best describe the contract's category/purpose: {tags}\"]\n}}\n\nContract source, with line numbers:\n{}",
        number_lines(source)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_right_aligned_to_width_four() {
        let numbered = number_lines("(a)\n(b)");
        assert_eq!(numbered, "   1  (a)\n   2  (b)");
    }

    #[test]
    fn wide_line_numbers_overflow_the_column() {
        let source = vec!["x"; 10_000].join("\n");
        let numbered = number_lines(&source);
        assert!(numbered.starts_with("   1  x\n"));
        assert!(numbered.ends_with("\n10000  x"));
    }

    #[test]
    fn blank_lines_keep_their_number() {
        let numbered = number_lines("a\n\nb\n");
        assert_eq!(numbered, "   1  a\n   2  \n   3  b\n   4  ");
    }

    #[test]
    fn prompt_ends_with_numbered_source() {
        let prompt = build_prompt("(define-data-var n uint u0)");
        assert!(prompt.contains("<L15-20>"));
        assert!(prompt.contains("fungible-token, DeFi"));
        assert!(prompt.ends_with("Contract source, with line numbers:\n   1  (define-data-var n uint u0)"));
    }
}
