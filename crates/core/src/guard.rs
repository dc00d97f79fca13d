//! Query guard: the safety gate between model-generated SQL and the database.
//!
//! The guard is a regex tokenizer followed by an ordered list of lexical rules
//! ([`GUARD_RULES`]). It is not a SQL parser. It accepts one narrow shape:
//!
//! ```text
//! SELECT <columns> FROM <table> [INNER JOIN <table> ON <expr>]
//!     [WHERE ...] [GROUP BY ...] [ORDER BY ...] LIMIT 100
//! ```
//!
//! Rules run in order and the first failure wins, so every rejection names exactly one
//! reason. A candidate is trimmed before validation and the approved query is that trimmed
//! text, byte for byte. The guard never rewrites model output.
//!
//! Known limits of a lexical gate:
//! - a qualified column (`e.salary`) is checked against every table in the schema, not
//!   against the table the qualifier refers to;
//! - expressions are not type-checked and the accepted shape can still produce expensive
//!   queries (large cross-filtered scans are bounded only by `LIMIT 100`);
//! - reserved words always classify as keywords, so a column named like one (`values`,
//!   `set`) must be double-quoted to be referenced;
//! - column aliases must be introduced with `AS` and are only recognised after `FROM`;
//!   table aliases are only recognised as a `alias.column` qualifier.
//!
//! Tightening or loosening any of these changes the safety/complexity tradeoff and belongs
//! in the rule list, not in callers.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::schema::SchemaDescription;

pub const MANDATORY_LIMIT: &str = "LIMIT 100";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("non-read-only statement")]
    NonReadOnly,
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
    #[error("join limit exceeded")]
    JoinLimitExceeded,
    #[error("missing mandatory LIMIT")]
    MissingLimit,
    #[error("disallowed clause or construct")]
    DisallowedConstruct,
}

impl Rejection {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::NonReadOnly => "non-read-only",
            Self::UnknownIdentifier(_) => "unknown-identifier",
            Self::JoinLimitExceeded => "join-limit",
            Self::MissingLimit => "missing-limit",
            Self::DisallowedConstruct => "disallowed-clause",
        }
    }
}

/// A query that passed every guard rule. Only this module can construct one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ApprovedQuery {
    sql: String,
}

impl ApprovedQuery {
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    pub fn into_inner(self) -> String {
        self.sql
    }
}

impl fmt::Display for ApprovedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardVerdict {
    Approved(ApprovedQuery),
    Rejected(Rejection),
}

impl GuardVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved(_))
    }

    pub fn into_result(self) -> Result<ApprovedQuery, Rejection> {
        match self {
            Self::Approved(query) => Ok(query),
            Self::Rejected(rejection) => Err(rejection),
        }
    }
}

pub struct GuardRule {
    pub name: &'static str,
    check: fn(&Candidate<'_>) -> Result<(), Rejection>,
}

impl fmt::Debug for GuardRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardRule").field("name", &self.name).finish()
    }
}

/// Guard policy, evaluated top to bottom.
pub const GUARD_RULES: [GuardRule; 5] = [
    GuardRule { name: "read_only", check: check_read_only },
    GuardRule { name: "known_identifiers", check: check_known_identifiers },
    GuardRule { name: "single_inner_join", check: check_single_inner_join },
    GuardRule { name: "mandatory_limit", check: check_mandatory_limit },
    GuardRule { name: "allowed_clauses", check: check_allowed_clauses },
];

#[derive(Clone, Copy, Debug, Default)]
pub struct QueryGuard;

impl QueryGuard {
    pub fn new() -> Self {
        Self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        GUARD_RULES.iter().map(|rule| rule.name).collect()
    }

    pub fn validate(&self, candidate: &str, schema: &SchemaDescription) -> GuardVerdict {
        validate(candidate, schema)
    }
}

pub fn validate(candidate: &str, schema: &SchemaDescription) -> GuardVerdict {
    let text = candidate.trim();
    let candidate = Candidate { text, tokens: tokenize(text), schema };

    for rule in &GUARD_RULES {
        if let Err(rejection) = (rule.check)(&candidate) {
            debug!(
                event_name = "guard.candidate_rejected",
                rule = rule.name,
                reason_code = rejection.reason_code(),
                "candidate query rejected"
            );
            return GuardVerdict::Rejected(rejection);
        }
    }

    GuardVerdict::Approved(ApprovedQuery { sql: text.to_string() })
}

struct Candidate<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    schema: &'a SchemaDescription,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    QuotedIdentifier(String),
    Literal,
    Number(String),
    Comment,
    Parameter,
    Unterminated,
    Semicolon,
    Comma,
    OpenParen,
    CloseParen,
    Dot,
    Symbol,
}

impl Token {
    fn is_word(&self, keyword: &str) -> bool {
        matches!(self, Self::Word(word) if word.eq_ignore_ascii_case(keyword))
    }
}

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
        (?P<comment>--[^\n]*|/\*(?s:.*?)(?:\*/|\z))
        |(?P<literal>'(?:[^']|'')*(?:'|\z))
        |(?P<quoted>"(?:[^"]|"")*(?:"|\z)|`[^`]*(?:`|\z))
        |(?P<number>\d+(?:\.\d*)?(?:[eE][+-]?\d+)?)
        |(?P<word>[A-Za-z_][A-Za-z0-9_]*)
        |(?P<parameter>[?:@$][A-Za-z0-9_]*)
        |(?P<semicolon>;)
        |(?P<comma>,)
        |(?P<open>\()
        |(?P<close>\))
        |(?P<dot>\.)
        |(?P<symbol>\S)
        "#,
    )
    .expect("guard token pattern is a valid regex")
});

fn tokenize(text: &str) -> Vec<Token> {
    TOKEN_PATTERN
        .captures_iter(text)
        .map(|captures| {
            if captures.name("comment").is_some() {
                Token::Comment
            } else if let Some(literal) = captures.name("literal") {
                let raw = literal.as_str();
                let quotes = raw.matches('\'').count();
                if raw.len() >= 2 && raw.ends_with('\'') && quotes % 2 == 0 {
                    Token::Literal
                } else {
                    Token::Unterminated
                }
            } else if let Some(quoted) = captures.name("quoted") {
                unquote(quoted.as_str())
            } else if let Some(number) = captures.name("number") {
                Token::Number(number.as_str().to_string())
            } else if let Some(word) = captures.name("word") {
                Token::Word(word.as_str().to_string())
            } else if captures.name("parameter").is_some() {
                Token::Parameter
            } else if captures.name("semicolon").is_some() {
                Token::Semicolon
            } else if captures.name("comma").is_some() {
                Token::Comma
            } else if captures.name("open").is_some() {
                Token::OpenParen
            } else if captures.name("close").is_some() {
                Token::CloseParen
            } else if captures.name("dot").is_some() {
                Token::Dot
            } else {
                Token::Symbol
            }
        })
        .collect()
}

fn unquote(raw: &str) -> Token {
    let mut chars = raw.chars();
    let (Some(open), Some(close)) = (chars.next(), chars.next_back()) else {
        return Token::Unterminated;
    };
    if open != close {
        return Token::Unterminated;
    }
    let inner = &raw[1..raw.len() - 1];
    match open {
        '"' => Token::QuotedIdentifier(inner.replace("\"\"", "\"")),
        _ => Token::QuotedIdentifier(inner.to_string()),
    }
}

const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "BY", "LIMIT", "INNER", "JOIN", "ON", "AS",
    "AND", "OR", "NOT", "IN", "IS", "NULL", "LIKE", "GLOB", "BETWEEN", "ASC", "DESC", "DISTINCT",
    "ALL", "CASE", "WHEN", "THEN", "ELSE", "END", "ESCAPE", "COLLATE", "NOCASE", "TRUE", "FALSE",
    "EXISTS", "INTEGER", "REAL", "TEXT", "NUMERIC", "BLOB",
];

const JOIN_MODIFIERS: &[&str] = &["LEFT", "RIGHT", "FULL", "OUTER", "CROSS", "NATURAL", "USING"];

const DISALLOWED_KEYWORDS: &[&str] = &[
    "HAVING", "UNION", "INTERSECT", "EXCEPT", "INTO", "WITH", "RECURSIVE", "OFFSET", "WINDOW",
    "OVER", "PARTITION", "FILTER", "RETURNING", "VALUES", "PRAGMA", "ATTACH", "DETACH", "INSERT",
    "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "REPLACE", "TRUNCATE", "UPSERT", "CONFLICT",
    "VACUUM", "REINDEX", "ANALYZE", "EXPLAIN", "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT",
    "RELEASE", "GRANT", "REVOKE", "SET", "INDEXED", "TRANSACTION", "TRIGGER", "VIEW", "TABLE",
    "INDEX",
];

/// Functions callable from an approved query. Any other `name(` is treated as an identifier
/// and fails the schema check.
const ALLOWED_FUNCTIONS: &[&str] = &[
    "COUNT", "SUM", "AVG", "MIN", "MAX", "TOTAL", "GROUP_CONCAT", "ROUND", "ABS", "LOWER",
    "UPPER", "LENGTH", "TRIM", "LTRIM", "RTRIM", "SUBSTR", "SUBSTRING", "INSTR", "REPLACE",
    "COALESCE", "IFNULL", "NULLIF", "IIF", "CAST", "DATE", "TIME", "DATETIME", "JULIANDAY",
    "STRFTIME", "PRINTF", "TYPEOF",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WordClass {
    Keyword,
    JoinModifier,
    Disallowed,
    Function,
    Identifier,
}

fn contains_ignore_case(list: &[&str], word: &str) -> bool {
    list.iter().any(|entry| entry.eq_ignore_ascii_case(word))
}

fn classify(tokens: &[Token], index: usize) -> Option<WordClass> {
    let word = match &tokens[index] {
        Token::Word(word) => word,
        Token::QuotedIdentifier(_) => return Some(WordClass::Identifier),
        _ => return None,
    };

    let is_call = matches!(tokens.get(index + 1), Some(Token::OpenParen));
    let class = if is_call && contains_ignore_case(ALLOWED_FUNCTIONS, word) {
        WordClass::Function
    } else if contains_ignore_case(KEYWORDS, word) {
        WordClass::Keyword
    } else if contains_ignore_case(JOIN_MODIFIERS, word) {
        WordClass::JoinModifier
    } else if contains_ignore_case(DISALLOWED_KEYWORDS, word) {
        WordClass::Disallowed
    } else {
        WordClass::Identifier
    };
    Some(class)
}

fn identifier_name(token: &Token) -> Option<&str> {
    match token {
        Token::Word(name) | Token::QuotedIdentifier(name) => Some(name),
        _ => None,
    }
}

fn is_identifier(tokens: &[Token], index: usize) -> bool {
    classify(tokens, index) == Some(WordClass::Identifier)
}

/// Positions of alias declarations: `... AS alias` and `FROM table alias`.
fn alias_positions(tokens: &[Token]) -> Vec<usize> {
    let mut positions = Vec::new();
    for index in 1..tokens.len() {
        if !is_identifier(tokens, index) {
            continue;
        }

        let previous = &tokens[index - 1];
        let after_as = previous.is_word("AS");
        let after_table_reference = index >= 2
            && is_identifier(tokens, index - 1)
            && (tokens[index - 2].is_word("FROM")
                || tokens[index - 2].is_word("JOIN")
                || tokens[index - 2] == Token::Comma);
        if after_as || after_table_reference {
            positions.push(index);
        }
    }
    positions
}

/// Index of the first `FROM`, or the token count when there is none.
fn from_position(tokens: &[Token]) -> usize {
    tokens.iter().position(|token| token.is_word("FROM")).unwrap_or(tokens.len())
}

/// Positions naming a table: the identifier right after `FROM`, `JOIN`, or a comma in the
/// `FROM` list.
fn table_reference_positions(tokens: &[Token], from: usize) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut in_from = false;
    let mut depth = 0usize;
    for index in from..tokens.len() {
        let token = &tokens[index];
        match token {
            Token::OpenParen => depth += 1,
            Token::CloseParen => depth = depth.saturating_sub(1),
            _ => {}
        }
        if token.is_word("FROM") {
            in_from = true;
        } else if ["WHERE", "GROUP", "ORDER", "LIMIT"].iter().any(|clause| token.is_word(clause)) {
            in_from = false;
        }
        if index == 0 || !is_identifier(tokens, index) {
            continue;
        }
        let previous = &tokens[index - 1];
        if previous.is_word("FROM")
            || previous.is_word("JOIN")
            || (in_from && depth == 0 && *previous == Token::Comma)
        {
            positions.push(index);
        }
    }
    positions
}

fn check_read_only(candidate: &Candidate<'_>) -> Result<(), Rejection> {
    let starts_with_select = candidate.tokens.first().is_some_and(|token| token.is_word("SELECT"))
        && candidate.text.get(..6).is_some_and(|head| head.eq_ignore_ascii_case("SELECT"));
    if !starts_with_select || candidate.tokens.contains(&Token::Semicolon) {
        return Err(Rejection::NonReadOnly);
    }
    Ok(())
}

fn declares(aliases: &[&str], name: &str) -> bool {
    aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name))
}

/// Table references must name schema tables. Alias names are only accepted where the alias
/// is in scope: table aliases as a `alias.column` qualifier, column aliases after `FROM`.
fn check_known_identifiers(candidate: &Candidate<'_>) -> Result<(), Rejection> {
    let tokens = &candidate.tokens;
    let schema = candidate.schema;
    let from = from_position(tokens);
    let aliases = alias_positions(tokens);
    let tables = table_reference_positions(tokens, from);

    let mut column_aliases = Vec::new();
    let mut table_aliases = Vec::new();
    for index in &aliases {
        if let Some(name) = identifier_name(&tokens[*index]) {
            if *index < from {
                column_aliases.push(name);
            } else {
                table_aliases.push(name);
            }
        }
    }

    for index in 0..tokens.len() {
        if !is_identifier(tokens, index) {
            continue;
        }
        let Some(name) = identifier_name(&tokens[index]) else {
            continue;
        };

        if tables.contains(&index) {
            if !schema.has_table(name) {
                return Err(Rejection::UnknownIdentifier(name.to_string()));
            }
            continue;
        }
        if aliases.contains(&index) {
            continue;
        }

        let is_qualifier = matches!(tokens.get(index + 1), Some(Token::Dot));
        let in_scope_alias = (is_qualifier && declares(&table_aliases, name))
            || (index > from && declares(&column_aliases, name));
        if !in_scope_alias && !schema.knows_identifier(name) {
            return Err(Rejection::UnknownIdentifier(name.to_string()));
        }
    }
    Ok(())
}

fn check_single_inner_join(candidate: &Candidate<'_>) -> Result<(), Rejection> {
    let tokens = &candidate.tokens;
    let mut joins = 0usize;
    let mut depth = 0usize;
    let mut in_from = false;

    for (index, token) in tokens.iter().enumerate() {
        match token {
            Token::OpenParen => depth += 1,
            Token::CloseParen => depth = depth.saturating_sub(1),
            Token::Comma if depth == 0 && in_from => return Err(Rejection::JoinLimitExceeded),
            Token::Word(word) => {
                if classify(tokens, index) == Some(WordClass::JoinModifier) {
                    return Err(Rejection::JoinLimitExceeded);
                }
                if word.eq_ignore_ascii_case("JOIN") {
                    joins += 1;
                    let explicit_inner = index > 0 && tokens[index - 1].is_word("INNER");
                    if joins > 1 || !explicit_inner {
                        return Err(Rejection::JoinLimitExceeded);
                    }
                }
                if depth == 0 {
                    if word.eq_ignore_ascii_case("FROM") {
                        in_from = true;
                    } else if ["WHERE", "GROUP", "ORDER", "LIMIT"]
                        .iter()
                        .any(|clause| word.eq_ignore_ascii_case(clause))
                    {
                        in_from = false;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_mandatory_limit(candidate: &Candidate<'_>) -> Result<(), Rejection> {
    let text = candidate.text;
    let textual = text
        .strip_suffix(MANDATORY_LIMIT)
        .is_some_and(|head| head.ends_with(|ch: char| ch.is_whitespace()));
    let lexical = match candidate.tokens.as_slice() {
        [.., Token::Word(keyword), Token::Number(value)] => keyword == "LIMIT" && value == "100",
        _ => false,
    };
    if textual && lexical {
        Ok(())
    } else {
        Err(Rejection::MissingLimit)
    }
}

fn check_allowed_clauses(candidate: &Candidate<'_>) -> Result<(), Rejection> {
    let tokens = &candidate.tokens;
    let mut selects = 0usize;
    let mut clause_counts = [0usize; 5];
    const CLAUSES: [&str; 5] = ["FROM", "WHERE", "GROUP", "ORDER", "LIMIT"];

    for (index, token) in tokens.iter().enumerate() {
        match token {
            Token::Comment | Token::Parameter | Token::Unterminated | Token::Semicolon => {
                return Err(Rejection::DisallowedConstruct);
            }
            Token::Word(word) => {
                if classify(tokens, index) == Some(WordClass::Disallowed) {
                    return Err(Rejection::DisallowedConstruct);
                }
                if word.eq_ignore_ascii_case("SELECT") {
                    selects += 1;
                }
                if let Some(slot) = CLAUSES.iter().position(|clause| word.eq_ignore_ascii_case(clause))
                {
                    clause_counts[slot] += 1;
                }
                let needs_by = word.eq_ignore_ascii_case("GROUP") || word.eq_ignore_ascii_case("ORDER");
                if needs_by && !tokens.get(index + 1).is_some_and(|next| next.is_word("BY")) {
                    return Err(Rejection::DisallowedConstruct);
                }
            }
            _ => {}
        }
    }

    if selects > 1 || clause_counts.iter().any(|count| *count > 1) {
        return Err(Rejection::DisallowedConstruct);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate, GuardVerdict, QueryGuard, Rejection, MANDATORY_LIMIT};
    use crate::domain::schema::{ColumnDescription, SchemaDescription};

    fn demo_schema() -> SchemaDescription {
        SchemaDescription::new()
            .with_table(
                "Employees",
                [
                    ColumnDescription::new("employee_id", "INTEGER"),
                    ColumnDescription::new("name", "TEXT"),
                    ColumnDescription::new("department", "TEXT"),
                    ColumnDescription::new("salary", "REAL"),
                ],
            )
            .with_table(
                "Departments",
                [ColumnDescription::new("dept_id", "INTEGER"), ColumnDescription::new("name", "TEXT")],
            )
    }

    fn abc_schema() -> SchemaDescription {
        ["a", "b", "c"].into_iter().fold(SchemaDescription::new(), |schema, table| {
            schema.with_table(table, [ColumnDescription::new("id", "INTEGER")])
        })
    }

    fn rejection(candidate: &str, schema: &SchemaDescription) -> Option<Rejection> {
        match validate(candidate, schema) {
            GuardVerdict::Approved(_) => None,
            GuardVerdict::Rejected(rejection) => Some(rejection),
        }
    }

    #[test]
    fn approves_simple_select_with_mandatory_limit() {
        let schema = SchemaDescription::new().with_table(
            "users",
            [ColumnDescription::new("id", "int"), ColumnDescription::new("name", "text")],
        );
        let verdict = validate("  SELECT * FROM users LIMIT 100\n", &schema);
        let approved = verdict.into_result().expect("query should be approved");
        assert_eq!(approved.as_str(), "SELECT * FROM users LIMIT 100");
    }

    #[test]
    fn rejects_anything_that_does_not_start_with_select() {
        let schema = demo_schema();
        for candidate in [
            "DELETE FROM Employees",
            "delete from Employees LIMIT 100",
            "UPDATE Employees SET salary = 100000 WHERE name = 'Bob Johnson'",
            "INSERT INTO Departments VALUES (4, 'Legal')",
            "DROP TABLE Employees",
            "ALTER TABLE Employees ADD COLUMN age INTEGER",
            "PRAGMA table_info(Employees)",
            "WITH x AS (SELECT 1) SELECT * FROM x LIMIT 100",
            "SELECTED name FROM Employees LIMIT 100",
            "/* hi */ SELECT name FROM Employees LIMIT 100",
            "",
        ] {
            assert_eq!(rejection(candidate, &schema), Some(Rejection::NonReadOnly), "{candidate}");
        }
    }

    #[test]
    fn select_keyword_is_case_insensitive() {
        let schema = demo_schema();
        assert!(validate("select name from Employees LIMIT 100", &schema).is_approved());
        assert!(validate("SeLeCt name FROM Employees LIMIT 100", &schema).is_approved());
    }

    #[test]
    fn rejects_multi_statement_input() {
        let schema = demo_schema();
        assert_eq!(
            rejection("SELECT name FROM Employees LIMIT 100; DROP TABLE Employees", &schema),
            Some(Rejection::NonReadOnly)
        );
        assert_eq!(
            rejection("SELECT name FROM Employees LIMIT 100;", &schema),
            Some(Rejection::NonReadOnly)
        );
    }

    #[test]
    fn semicolons_inside_literals_are_not_separators() {
        let schema = demo_schema();
        assert!(validate("SELECT name FROM Employees WHERE name = 'a;b' LIMIT 100", &schema)
            .is_approved());
    }

    #[test]
    fn rejects_unknown_table() {
        assert_eq!(
            rejection("SELECT * FROM secrets LIMIT 100", &demo_schema()),
            Some(Rejection::UnknownIdentifier("secrets".to_string()))
        );
        assert_eq!(
            Rejection::UnknownIdentifier("secrets".to_string()).to_string(),
            "unknown identifier: secrets"
        );
    }

    #[test]
    fn rejects_unknown_column_even_when_sql_is_otherwise_valid() {
        assert_eq!(
            rejection("SELECT name, age FROM Employees LIMIT 100", &demo_schema()),
            Some(Rejection::UnknownIdentifier("age".to_string()))
        );
        assert_eq!(
            rejection("SELECT \"password\" FROM Employees LIMIT 100", &demo_schema()),
            Some(Rejection::UnknownIdentifier("password".to_string()))
        );
    }

    #[test]
    fn unlisted_functions_are_unknown_identifiers() {
        assert_eq!(
            rejection("SELECT load_extension('x') FROM Employees LIMIT 100", &demo_schema()),
            Some(Rejection::UnknownIdentifier("load_extension".to_string()))
        );
    }

    #[test]
    fn declared_aliases_are_not_schema_references() {
        let schema = demo_schema();
        let candidate = "SELECT e.name, d.name AS dept_name FROM Employees e \
                         INNER JOIN Departments AS d ON e.department = d.name \
                         ORDER BY dept_name LIMIT 100";
        assert!(validate(candidate, &schema).is_approved());

        let aggregate = "SELECT department, AVG(salary) AS avg_salary FROM Employees \
                         GROUP BY department ORDER BY avg_salary DESC LIMIT 100";
        assert!(validate(aggregate, &schema).is_approved());
    }

    #[test]
    fn aliasing_an_unknown_table_with_its_own_name_is_rejected() {
        let schema = demo_schema();
        for candidate in [
            "SELECT * FROM secrets AS secrets LIMIT 100",
            "SELECT * FROM secrets secrets LIMIT 100",
            "SELECT secrets.name FROM secrets AS secrets LIMIT 100",
            "SELECT e.name FROM Employees e INNER JOIN secrets secrets ON e.name = secrets.name LIMIT 100",
        ] {
            assert_eq!(
                rejection(candidate, &schema),
                Some(Rejection::UnknownIdentifier("secrets".to_string())),
                "{candidate}"
            );
        }
    }

    #[test]
    fn table_references_must_name_tables_not_columns() {
        assert_eq!(
            rejection("SELECT * FROM salary LIMIT 100", &demo_schema()),
            Some(Rejection::UnknownIdentifier("salary".to_string()))
        );
    }

    #[test]
    fn column_alias_cannot_vouch_for_its_own_source() {
        let schema = demo_schema();
        assert_eq!(
            rejection("SELECT password AS password FROM Employees LIMIT 100", &schema),
            Some(Rejection::UnknownIdentifier("password".to_string()))
        );
        assert_eq!(
            rejection(
                "SELECT password AS password FROM Employees ORDER BY password LIMIT 100",
                &schema
            ),
            Some(Rejection::UnknownIdentifier("password".to_string()))
        );
        assert_eq!(
            rejection("SELECT salary AS pay, pay FROM Employees LIMIT 100", &schema),
            Some(Rejection::UnknownIdentifier("pay".to_string()))
        );
    }

    #[test]
    fn table_aliases_only_stand_in_as_qualifiers() {
        let schema = demo_schema();
        assert!(validate("SELECT e.name FROM Employees AS e LIMIT 100", &schema).is_approved());
        assert_eq!(
            rejection("SELECT e FROM Employees AS e LIMIT 100", &schema),
            Some(Rejection::UnknownIdentifier("e".to_string()))
        );
    }

    #[test]
    fn string_literals_are_not_identifiers() {
        assert!(validate(
            "SELECT name FROM Employees WHERE department = 'Engineering' LIMIT 100",
            &demo_schema()
        )
        .is_approved());
    }

    #[test]
    fn rejects_second_join() {
        let candidate =
            "SELECT a.id FROM a INNER JOIN b ON a.id=b.id INNER JOIN c ON b.id=c.id LIMIT 100";
        assert_eq!(rejection(candidate, &abc_schema()), Some(Rejection::JoinLimitExceeded));
        assert_eq!(Rejection::JoinLimitExceeded.to_string(), "join limit exceeded");
    }

    #[test]
    fn rejects_non_inner_joins() {
        let schema = abc_schema();
        for candidate in [
            "SELECT a.id FROM a LEFT JOIN b ON a.id = b.id LIMIT 100",
            "SELECT a.id FROM a LEFT OUTER JOIN b ON a.id = b.id LIMIT 100",
            "SELECT a.id FROM a CROSS JOIN b LIMIT 100",
            "SELECT a.id FROM a JOIN b ON a.id = b.id LIMIT 100",
            "SELECT a.id FROM a NATURAL JOIN b LIMIT 100",
            "SELECT a.id FROM a, b WHERE a.id = b.id LIMIT 100",
        ] {
            assert_eq!(rejection(candidate, &schema), Some(Rejection::JoinLimitExceeded), "{candidate}");
        }
    }

    #[test]
    fn single_inner_join_is_allowed() {
        assert!(validate("SELECT a.id FROM a INNER JOIN b ON a.id = b.id LIMIT 100", &abc_schema())
            .is_approved());
    }

    #[test]
    fn commas_in_select_list_and_function_calls_are_not_joins() {
        assert!(validate(
            "SELECT name, ROUND(salary, 0) FROM Employees WHERE salary BETWEEN 1 AND 2 LIMIT 100",
            &demo_schema()
        )
        .is_approved());
    }

    #[test]
    fn rejects_missing_or_different_limit_without_rewriting() {
        let schema = demo_schema();
        for candidate in [
            "SELECT name FROM Employees",
            "SELECT name FROM Employees LIMIT 10",
            "SELECT name FROM Employees LIMIT 1000",
            "SELECT name FROM Employees limit 100",
            "SELECT name FROM Employees LIMIT 100 OFFSET 5",
            "SELECT name FROM Employees WHERE name = 'x LIMIT 100",
        ] {
            assert_eq!(rejection(candidate, &schema), Some(Rejection::MissingLimit), "{candidate}");
        }
    }

    #[test]
    fn rejects_constructs_outside_the_clause_set() {
        let schema = demo_schema();
        for candidate in [
            "SELECT name FROM Employees WHERE salary > (SELECT AVG(salary) FROM Employees) LIMIT 100",
            "SELECT name FROM Employees UNION SELECT name FROM Departments LIMIT 100",
            "SELECT department FROM Employees GROUP BY department HAVING COUNT(*) > 1 LIMIT 100",
            "SELECT name INTO Departments FROM Employees LIMIT 100",
            "SELECT name FROM Employees /* ; DROP TABLE Employees */ LIMIT 100",
            "SELECT name FROM Employees WHERE name = ? LIMIT 100",
            "SELECT name FROM Employees WHERE 1 = 1 AND name = 'x' -- trailing\nLIMIT 100",
            "SELECT name FROM Employees WHERE salary > 1 WHERE salary < 2 LIMIT 100",
        ] {
            assert_eq!(
                rejection(candidate, &schema),
                Some(Rejection::DisallowedConstruct),
                "{candidate}"
            );
        }
    }

    #[test]
    fn first_failing_rule_wins() {
        // unknown identifier is reported before the missing limit and the union
        assert_eq!(
            rejection("SELECT * FROM secrets UNION SELECT 1", &demo_schema()),
            Some(Rejection::UnknownIdentifier("secrets".to_string()))
        );
    }

    #[test]
    fn approved_queries_end_with_the_mandatory_limit_and_revalidate() {
        let schema = demo_schema();
        for candidate in [
            "SELECT * FROM Employees LIMIT 100",
            "SELECT name, salary FROM Employees ORDER BY salary DESC LIMIT 100",
            "SELECT COUNT(*) AS total FROM Departments LIMIT 100",
            "SELECT e.name FROM Employees AS e INNER JOIN Departments AS d ON e.department = d.name WHERE d.dept_id = 2 LIMIT 100",
        ] {
            let approved = validate(candidate, &schema).into_result().expect(candidate);
            assert!(approved.as_str().ends_with(MANDATORY_LIMIT));
            assert_eq!(
                validate(approved.as_str(), &schema),
                GuardVerdict::Approved(approved.clone()),
                "validation should be idempotent"
            );
        }
    }

    #[test]
    fn rule_list_is_ordered_and_auditable() {
        assert_eq!(
            QueryGuard::new().rule_names(),
            vec![
                "read_only",
                "known_identifiers",
                "single_inner_join",
                "mandatory_limit",
                "allowed_clauses"
            ]
        );
    }

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(Rejection::NonReadOnly.reason_code(), "non-read-only");
        assert_eq!(Rejection::MissingLimit.reason_code(), "missing-limit");
        assert_eq!(Rejection::DisallowedConstruct.reason_code(), "disallowed-clause");
    }
}
