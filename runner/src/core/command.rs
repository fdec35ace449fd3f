//! Shell-like command line parsing and declarative command matching.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::template::resolve_str;
use crate::core::types::{OneOrMany, Vars};

/// Expected command shape declared by a `command` rule's `match` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandPattern {
    pub program: String,
    /// Leading non-flag tokens, compared positionally. Further leading
    /// tokens are arguments and are not checked.
    #[serde(default, alias = "subcommands")]
    pub subcommand: OneOrMany<String>,
    #[serde(default)]
    pub required_flags: Vec<String>,
    /// Flag name -> templated expected value (exact match).
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    /// Alias flag name -> canonical flag name.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl CommandPattern {
    /// Expected subcommand tokens; string entries are split on whitespace.
    pub fn subcommand_tokens(&self) -> Vec<String> {
        self.subcommand
            .as_slice()
            .iter()
            .flat_map(|entry| entry.split_whitespace())
            .map(str::to_string)
            .collect()
    }
}

/// A tokenized command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedCommand {
    pub program: String,
    pub subcommand: Vec<String>,
    /// Flag as written -> value (`None` for bare boolean flags).
    pub flags: BTreeMap<String, Option<String>>,
    /// Non-flag tokens after the first flag that no flag consumed.
    pub positionals: Vec<String>,
}

/// Result of matching a parsed line against a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandVerdict {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl CommandVerdict {
    fn fail(message: String) -> Self {
        Self {
            ok: false,
            errors: vec![message],
        }
    }
}

/// Split a line into tokens, honoring single- and double-quoted substrings.
///
/// Quotes group characters and are stripped; an unterminated quote runs to the
/// end of the line.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => current.push(ch),
            None if ch == '\'' || ch == '"' => {
                quote = Some(ch);
                in_token = true;
            }
            None if ch.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(ch);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Parse a command line into program, subcommand tokens and flags.
///
/// Returns `None` for a blank line. Flags accept `--name value`,
/// `--name=value`, bare `--name` and the single-dash forms.
pub fn parse_command(line: &str) -> Option<ParsedCommand> {
    let mut tokens = tokenize(line).into_iter().peekable();
    let program = tokens.next()?;

    let mut subcommand = Vec::new();
    while let Some(token) = tokens.next_if(|token| !is_flag(token)) {
        subcommand.push(token);
    }

    let mut flags = BTreeMap::new();
    let mut positionals = Vec::new();
    while let Some(token) = tokens.next() {
        if !is_flag(&token) {
            positionals.push(token);
            continue;
        }
        if let Some((name, value)) = token.split_once('=') {
            flags.insert(name.to_string(), Some(value.to_string()));
            continue;
        }
        let value = tokens.next_if(|next| !is_flag(next));
        flags.insert(token, value);
    }

    Some(ParsedCommand {
        program,
        subcommand,
        flags,
        positionals,
    })
}

/// Match a parsed line against `pattern`, templating expected values with `vars`.
///
/// Program and subcommand mismatches stop early; every flag problem is reported.
pub fn match_command(pattern: &CommandPattern, parsed: &ParsedCommand, vars: &Vars) -> CommandVerdict {
    let program = resolve_str(&pattern.program, vars);
    if parsed.program != program.trim() {
        return CommandVerdict::fail(format!(
            "Expected the command to start with `{}`, got `{}`.",
            program.trim(),
            parsed.program
        ));
    }

    let expected_sub: Vec<String> = pattern
        .subcommand_tokens()
        .iter()
        .map(|token| resolve_str(token, vars).into_owned())
        .collect();
    if !parsed.subcommand.starts_with(&expected_sub) {
        let mut expected = vec![program.trim().to_string()];
        expected.extend(expected_sub);
        return CommandVerdict::fail(format!("Expected `{}`.", expected.join(" ")));
    }

    let aliases: BTreeMap<String, String> = pattern
        .aliases
        .iter()
        .map(|(alias, canonical)| (normalize_flag(alias), normalize_flag(canonical)))
        .collect();
    let flags: BTreeMap<String, Option<String>> = parsed
        .flags
        .iter()
        .map(|(name, value)| {
            let name = normalize_flag(name);
            let canonical = aliases.get(&name).cloned().unwrap_or(name);
            (canonical, value.clone())
        })
        .collect();

    let mut errors = Vec::new();
    for required in &pattern.required_flags {
        let required = normalize_flag(required);
        if !flags.contains_key(&required) {
            errors.push(format!("Missing required flag `{required}`."));
        }
    }
    for (flag, expected) in &pattern.args {
        let flag = normalize_flag(flag);
        let expected = resolve_str(expected, vars);
        match flags.get(&flag) {
            None => {
                if !pattern
                    .required_flags
                    .iter()
                    .any(|required| normalize_flag(required) == flag)
                {
                    errors.push(format!("Missing required flag `{flag}`."));
                }
            }
            Some(actual) => {
                let actual = actual.as_deref().unwrap_or("true");
                if actual != expected {
                    errors.push(format!("Unexpected value for `{flag}`."));
                }
            }
        }
    }

    CommandVerdict {
        ok: errors.is_empty(),
        errors,
    }
}

/// Give a declared flag name its dashes: `bucket` -> `--bucket`, `r` -> `-r`.
pub fn normalize_flag(name: &str) -> String {
    let name = name.trim();
    if name.starts_with('-') {
        name.to_string()
    } else if name.chars().count() == 1 {
        format!("-{name}")
    } else {
        format!("--{name}")
    }
}

fn is_flag(token: &str) -> bool {
    token.len() > 1 && token.starts_with('-') && token[1..].parse::<f64>().is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bucket_pattern() -> CommandPattern {
        serde_json::from_value(json!({
            "program": "aws",
            "subcommand": ["s3api", "create-bucket"],
            "required_flags": ["--bucket", "--region"],
            "args": {"--bucket": "{{bucket}}", "--region": "us-east-1"},
            "aliases": {"-r": "--region"}
        }))
        .expect("pattern")
    }

    fn vars() -> Vars {
        Vars::from([("bucket".to_string(), json!("acme"))])
    }

    fn check(line: &str) -> CommandVerdict {
        let parsed = parse_command(line).expect("parsed");
        match_command(&bucket_pattern(), &parsed, &vars())
    }

    #[test]
    fn tokenize_honors_quotes() {
        assert_eq!(
            tokenize(r#"echo "hello world" 'a b' --tag="x y""#),
            vec!["echo", "hello world", "a b", "--tag=x y"]
        );
        assert_eq!(tokenize("say ''"), vec!["say", ""]);
    }

    #[test]
    fn parse_splits_program_subcommand_and_flags() {
        let parsed = parse_command("kubectl get pods -n kube-system --watch --limit=5 -o wide")
            .expect("parsed");
        assert_eq!(parsed.program, "kubectl");
        assert_eq!(parsed.subcommand, vec!["get", "pods"]);
        assert_eq!(parsed.flags["-n"], Some("kube-system".to_string()));
        assert_eq!(parsed.flags["--watch"], None);
        assert_eq!(parsed.flags["--limit"], Some("5".to_string()));
        assert_eq!(parsed.flags["-o"], Some("wide".to_string()));
    }

    #[test]
    fn parse_blank_line_is_none() {
        assert!(parse_command("   ").is_none());
    }

    #[test]
    fn negative_numbers_are_values_not_flags() {
        let parsed = parse_command("calc --offset -3").expect("parsed");
        assert_eq!(parsed.flags["--offset"], Some("-3".to_string()));
    }

    #[test]
    fn matching_bucket_command_is_ok() {
        let verdict = check("aws s3api create-bucket --bucket acme --region us-east-1");
        assert!(verdict.ok, "{:?}", verdict.errors);
    }

    #[test]
    fn equals_form_and_alias_are_accepted() {
        assert!(check("aws s3api create-bucket --bucket=acme -r us-east-1").ok);
        assert!(check("aws s3api create-bucket --region 'us-east-1' --bucket \"acme\"").ok);
    }

    #[test]
    fn wrong_value_names_the_flag() {
        let verdict = check("aws s3api create-bucket --bucket acme --region eu-west-1");
        assert!(!verdict.ok);
        assert_eq!(verdict.errors, vec!["Unexpected value for `--region`.".to_string()]);
    }

    #[test]
    fn missing_flag_is_reported_once() {
        let verdict = check("aws s3api create-bucket --bucket acme");
        assert_eq!(verdict.errors, vec!["Missing required flag `--region`.".to_string()]);
    }

    #[test]
    fn wrong_program_or_subcommand_fails_early() {
        assert!(check("gcloud s3api create-bucket --bucket acme").errors[0].contains("`aws`"));
        let verdict = check("aws s3api delete-bucket --bucket acme --region us-east-1");
        assert_eq!(verdict.errors, vec!["Expected `aws s3api create-bucket`.".to_string()]);
    }

    #[test]
    fn subcommand_may_be_declared_as_one_string() {
        let pattern: CommandPattern =
            serde_json::from_value(json!({"program": "echo", "subcommand": "hi"})).expect("pattern");
        let parsed = parse_command("echo hi").expect("parsed");
        assert!(match_command(&pattern, &parsed, &Vars::new()).ok);
        let parsed = parse_command("echo hello").expect("parsed");
        assert!(!match_command(&pattern, &parsed, &Vars::new()).ok);
    }

    #[test]
    fn trailing_arguments_after_the_subcommand_are_allowed() {
        let pattern: CommandPattern =
            serde_json::from_value(json!({"program": "git", "subcommand": ["clone"]})).expect("pattern");
        let parsed = parse_command("git clone https://example.com/repo.git").expect("parsed");
        assert!(match_command(&pattern, &parsed, &Vars::new()).ok);
        let parsed = parse_command("git").expect("parsed");
        assert_eq!(
            match_command(&pattern, &parsed, &Vars::new()).errors,
            vec!["Expected `git clone`.".to_string()]
        );
    }
}
