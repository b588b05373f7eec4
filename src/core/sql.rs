//! Statement text handling for the terminal.
//!
//! Player input is normalized (trimmed, whitespace collapsed outside quotes,
//! comments dropped), tokenized with literal awareness, and, where a query has
//! to be narrowed, parsed into a minimal single-source `SELECT` shape that can
//! be re-rendered. Nothing here case-folds literal or identifier text; folding
//! only happens at comparison time.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    QuotedIdent,
    StringLit,
    Number,
    Symbol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offsets into the text the token was cut from.
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// Case-folded identifier value of words and quoted identifiers.
    pub fn ident(&self) -> Option<String> {
        match self.kind {
            TokenKind::Word => Some(self.text.to_ascii_lowercase()),
            TokenKind::QuotedIdent => Some(unquote(&self.text).to_ascii_lowercase()),
            _ => None,
        }
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }

    /// Argument value: quotes stripped from literals and quoted identifiers.
    pub fn value(&self) -> String {
        match self.kind {
            TokenKind::StringLit | TokenKind::QuotedIdent => unquote(&self.text),
            _ => self.text.clone(),
        }
    }
}

fn closing_quote(c: char) -> Option<char> {
    match c {
        '\'' => Some('\''),
        '"' => Some('"'),
        '`' => Some('`'),
        '[' => Some(']'),
        _ => None,
    }
}

fn is_compound(first: char, second: char) -> bool {
    matches!(
        (first, second),
        ('<', '=') | ('>', '=') | ('<', '>') | ('!', '=') | ('=', '=') | ('|', '|')
    )
}

/// Strips one level of SQL quoting. Doubled quote characters collapse.
pub fn unquote(text: &str) -> String {
    let Some(open) = text.chars().next() else {
        return String::new();
    };
    let Some(close) = closing_quote(open) else {
        return text.to_string();
    };
    let body = &text[open.len_utf8()..];
    let body = body.strip_suffix(close).unwrap_or(body);
    if open == close {
        body.replace(&format!("{close}{close}"), &close.to_string())
    } else {
        body.to_string()
    }
}

/// Trim, collapse whitespace runs outside quoted text, drop comments.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.trim().chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c == '-' && chars.peek() == Some(&'-') {
            for n in chars.by_ref() {
                if n == '\n' {
                    break;
                }
            }
            pending_space = true;
            continue;
        }
        if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut prev = '\0';
            for n in chars.by_ref() {
                if prev == '*' && n == '/' {
                    break;
                }
                prev = n;
            }
            pending_space = true;
            continue;
        }

        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);

        if let Some(close) = closing_quote(c) {
            for n in chars.by_ref() {
                out.push(n);
                if n == close {
                    break;
                }
            }
        }
    }
    out
}

/// Split text into tokens. String literals and quoted identifiers are single tokens.
pub fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let offset = |j: usize| chars.get(j).map(|(o, _)| *o).unwrap_or(text.len());
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (start, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, n)| *n);

        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '-' && next == Some('-') {
            while i < chars.len() && chars[i].1 != '\n' {
                i += 1;
            }
            continue;
        }

        let mut j = i + 1;
        let kind = if let Some(close) = closing_quote(c) {
            while j < chars.len() {
                let ch = chars[j].1;
                j += 1;
                if ch == close {
                    if close != ']' && chars.get(j).map(|(_, n)| *n) == Some(close) {
                        j += 1;
                        continue;
                    }
                    break;
                }
            }
            if c == '\'' {
                TokenKind::StringLit
            } else {
                TokenKind::QuotedIdent
            }
        } else if c.is_ascii_digit() {
            while j < chars.len() && (chars[j].1.is_ascii_alphanumeric() || chars[j].1 == '.') {
                j += 1;
            }
            TokenKind::Number
        } else if c.is_alphabetic() || c == '_' {
            while j < chars.len()
                && (chars[j].1.is_alphanumeric() || chars[j].1 == '_' || chars[j].1 == '$')
            {
                j += 1;
            }
            TokenKind::Word
        } else {
            if next.is_some_and(|n| is_compound(c, n)) {
                j += 1;
            }
            TokenKind::Symbol
        };

        let end = offset(j);
        tokens.push(Token {
            kind,
            text: text[start..end].to_string(),
            start,
            end,
        });
        i = j;
    }
    tokens
}

/// A normalized player command and its tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub text: String,
    pub tokens: Vec<Token>,
}

const STATEMENT_VERBS: &[&str] = &["select", "insert", "update", "delete", "replace"];

impl Command {
    pub fn parse(raw: &str) -> Self {
        let text = normalize(raw);
        let tokens = tokenize(&text);
        Self { text, tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// First word of the command, case-folded.
    pub fn verb(&self) -> Option<String> {
        self.tokens
            .first()
            .filter(|t| t.kind == TokenKind::Word)
            .and_then(Token::ident)
    }

    /// The verb that decides what the statement does. `WITH` prefixes are
    /// skipped to the first top-level DML/query keyword.
    pub fn statement_verb(&self) -> Option<String> {
        let verb = self.verb()?;
        if verb != "with" {
            return Some(verb);
        }
        let mut depth = 0usize;
        for token in &self.tokens[1..] {
            if token.is_symbol("(") {
                depth += 1;
            } else if token.is_symbol(")") {
                depth = depth.saturating_sub(1);
            } else if depth == 0 && token.kind == TokenKind::Word {
                let word = token.text.to_ascii_lowercase();
                if STATEMENT_VERBS.contains(&word.as_str()) {
                    return Some(word);
                }
            }
        }
        Some(verb)
    }

    /// Arguments after the verb.
    pub fn args(&self) -> &[Token] {
        self.tokens.get(1..).unwrap_or(&[])
    }

    /// True when any identifier token (outside literals) names `table`.
    pub fn references(&self, table: &str) -> bool {
        self.tokens
            .iter()
            .filter_map(Token::ident)
            .any(|ident| ident.eq_ignore_ascii_case(table))
    }

    /// Number of non-empty `;`-separated statements.
    pub fn statement_count(&self) -> usize {
        let mut count = 0;
        let mut open = false;
        for token in &self.tokens {
            if token.is_symbol(";") {
                if open {
                    count += 1;
                }
                open = false;
            } else {
                open = true;
            }
        }
        if open {
            count += 1;
        }
        count
    }

    /// Table written by an INSERT, REPLACE, UPDATE or DELETE, case-folded.
    /// A `main.` schema prefix is skipped.
    pub fn target_table(&self) -> Option<String> {
        let verb = self.statement_verb()?;
        let at = self.tokens.iter().position(|t| t.is_keyword(&verb))?;
        let rest = &self.tokens[at + 1..];
        let mut name_at = match verb.as_str() {
            "update" if rest.first()?.is_keyword("or") => 2,
            "update" => 0,
            "insert" | "replace" => rest.iter().position(|t| t.is_keyword("into"))? + 1,
            "delete" => rest.iter().position(|t| t.is_keyword("from"))? + 1,
            _ => return None,
        };
        if rest.get(name_at + 1).is_some_and(|t| t.is_symbol(".")) {
            name_at += 2;
        }
        rest.get(name_at)?.ident()
    }

    /// Integer literals appearing in the command.
    pub fn integers(&self) -> impl Iterator<Item = i64> + '_ {
        self.tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Number)
            .filter_map(|t| t.text.parse::<i64>().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Clause {
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
}

/// Minimal single-source SELECT: select list, source, filter, group, order, limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub head: String,
    pub source: String,
    pub filter: Option<String>,
    pub group_by: Option<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<String>,
}

/// The table a simple `FROM` clause reads, with the text used to qualify columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTable {
    pub name: String,
    pub qualifier: String,
}

fn span(text: &str, tokens: &[Token], from: usize, to: usize) -> Option<String> {
    if from >= to {
        return None;
    }
    Some(text[tokens[from].start..tokens[to - 1].end].to_string())
}

impl Select {
    /// Parse a command into the minimal shape. Returns `None` for anything
    /// else: joins, subqueries, compound selects, CTEs, multiple statements,
    /// unbalanced parentheses, or clauses out of order.
    pub fn parse(command: &Command) -> Option<Select> {
        let mut tokens = command.tokens.as_slice();
        if !tokens.first()?.is_keyword("select") {
            return None;
        }
        while tokens.len() > 1 && tokens[tokens.len() - 1].is_symbol(";") {
            tokens = &tokens[..tokens.len() - 1];
        }

        let mut marks: Vec<(Clause, usize, usize)> = Vec::new();
        let mut depth = 0usize;
        let mut i = 1;
        while i < tokens.len() {
            let token = &tokens[i];
            if token.is_symbol("(") {
                depth += 1;
            } else if token.is_symbol(")") {
                depth = depth.checked_sub(1)?;
            } else if token.is_symbol(";") || token.is_keyword("select") || token.is_keyword("with")
            {
                return None;
            } else if depth == 0 && token.kind == TokenKind::Word {
                let next_is_by = tokens.get(i + 1).is_some_and(|t| t.is_keyword("by"));
                let clause = match token.text.to_ascii_lowercase().as_str() {
                    "union" | "intersect" | "except" | "join" | "window" => return None,
                    "from" => Some((Clause::From, 1)),
                    "where" => Some((Clause::Where, 1)),
                    "group" if next_is_by => Some((Clause::GroupBy, 2)),
                    "having" => Some((Clause::Having, 1)),
                    "order" if next_is_by => Some((Clause::OrderBy, 2)),
                    "limit" => Some((Clause::Limit, 1)),
                    _ => None,
                };
                if let Some((clause, width)) = clause {
                    if marks.last().is_some_and(|(prev, _, _)| *prev >= clause) {
                        return None;
                    }
                    marks.push((clause, i, i + width));
                    i += width;
                    continue;
                }
            }
            i += 1;
        }
        if depth != 0 {
            return None;
        }

        let (first_clause, from_at, _) = *marks.first()?;
        if first_clause != Clause::From {
            return None;
        }
        let mut select = Select {
            head: span(&command.text, tokens, 1, from_at)?,
            source: String::new(),
            filter: None,
            group_by: None,
            having: None,
            order_by: None,
            limit: None,
        };
        for (n, (clause, _, body_start)) in marks.iter().enumerate() {
            let body_end = marks.get(n + 1).map(|m| m.1).unwrap_or(tokens.len());
            let body = span(&command.text, tokens, *body_start, body_end)?;
            match clause {
                Clause::From => select.source = body,
                Clause::Where => select.filter = Some(body),
                Clause::GroupBy => select.group_by = Some(body),
                Clause::Having => select.having = Some(body),
                Clause::OrderBy => select.order_by = Some(body),
                Clause::Limit => select.limit = Some(body),
            }
        }
        Some(select)
    }

    /// The single table named by the `FROM` clause, if it is that simple.
    pub fn source_table(&self) -> Option<SourceTable> {
        let tokens = tokenize(&self.source);
        let is_name = |t: &Token| matches!(t.kind, TokenKind::Word | TokenKind::QuotedIdent);
        let (table, alias) = match tokens.as_slice() {
            [table] if is_name(table) => (table, None),
            [table, alias] if is_name(table) && is_name(alias) => (table, Some(alias)),
            [table, kw, alias] if is_name(table) && kw.is_keyword("as") && is_name(alias) => {
                (table, Some(alias))
            }
            _ => return None,
        };
        Some(SourceTable {
            name: table.ident()?,
            qualifier: alias.unwrap_or(table).text.clone(),
        })
    }

    /// Add `predicate` as a top-level conjunct of the filter. Applying the same
    /// predicate to output of this method returns it unchanged.
    pub fn and_where(&self, predicate: &str) -> Select {
        let filter = match &self.filter {
            None => predicate.to_string(),
            Some(existing) if existing == predicate => existing.clone(),
            Some(existing) => match existing
                .strip_suffix(predicate)
                .and_then(|head| head.strip_suffix(" AND "))
            {
                Some(head) if is_enclosed(head) => existing.clone(),
                _ => format!("({existing}) AND {predicate}"),
            },
        };
        Select {
            filter: Some(filter),
            ..self.clone()
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("SELECT {} FROM {}", self.head, self.source);
        let clauses = [
            ("WHERE", &self.filter),
            ("GROUP BY", &self.group_by),
            ("HAVING", &self.having),
            ("ORDER BY", &self.order_by),
            ("LIMIT", &self.limit),
        ];
        for (keyword, body) in clauses {
            if let Some(body) = body {
                out.push(' ');
                out.push_str(keyword);
                out.push(' ');
                out.push_str(body);
            }
        }
        out
    }
}

/// True when `expr` is one parenthesized group: `( ... )` with the first
/// parenthesis closing at the very end.
pub fn is_enclosed(expr: &str) -> bool {
    let tokens = tokenize(expr);
    let last = tokens.len().saturating_sub(1);
    if tokens.len() < 2 || !tokens[0].is_symbol("(") || !tokens[last].is_symbol(")") {
        return false;
    }
    let mut depth = 0i32;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_symbol("(") {
            depth += 1;
        } else if token.is_symbol(")") {
            depth -= 1;
            if depth == 0 && i != last {
                return false;
            }
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_outside_literals() {
        let text = normalize("  SELECT   name,\n\tpassword  FROM  User WHERE name = 'a   B'  ");
        assert_eq!(text, "SELECT name, password FROM User WHERE name = 'a   B'");
    }

    #[test]
    fn normalize_drops_comments_without_swallowing_the_statement() {
        let text = normalize("SELECT * -- everything\nFROM User /* all */ WHERE 1");
        assert_eq!(text, "SELECT * FROM User WHERE 1");
    }

    #[test]
    fn normalize_keeps_doubled_quotes_intact() {
        assert_eq!(normalize("SELECT  'it''s   here'"), "SELECT 'it''s   here'");
    }

    #[test]
    fn tokenize_keeps_literals_and_addresses_whole() {
        let tokens = tokenize("CONNECT 174.156.12.4");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].kind, TokenKind::Number);
        assert_eq!(tokens[1].text, "174.156.12.4");

        let tokens = tokenize("WHERE title = 'Hints <= x' AND id<=3");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Symbol,
                TokenKind::StringLit,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Symbol,
                TokenKind::Number,
            ]
        );
        assert_eq!(tokens[6].text, "<=");
    }

    #[test]
    fn unquote_handles_each_quote_style() {
        assert_eq!(unquote("'it''s'"), "it's");
        assert_eq!(unquote("\"Hints\""), "Hints");
        assert_eq!(unquote("[User]"), "User");
        assert_eq!(unquote("plain"), "plain");
    }

    #[test]
    fn references_ignores_string_literals_and_folds_case() {
        let command = Command::parse("SELECT 'Hints' FROM user");
        assert!(!command.references("hints"));
        assert!(command.references("User"));

        let quoted = Command::parse("SELECT * FROM \"Hints\"");
        assert!(quoted.references("hints"));
    }

    #[test]
    fn statement_verb_skips_cte_prefix() {
        let command =
            Command::parse("WITH x AS (SELECT 1) UPDATE Firewall SET status = 'inactive'");
        assert_eq!(command.verb().as_deref(), Some("with"));
        assert_eq!(command.statement_verb().as_deref(), Some("update"));
    }

    #[test]
    fn target_table_finds_the_written_table() {
        let cases = [
            ("UPDATE Firewall SET status = 'inactive'", Some("firewall")),
            ("update or ignore main.Router set locked = 0", Some("router")),
            (
                "INSERT INTO User_has_access_to_PC VALUES ('student', '10.0.0.11')",
                Some("user_has_access_to_pc"),
            ),
            ("REPLACE INTO \"Hints\" VALUES (1, 'a', 'b')", Some("hints")),
            ("DELETE FROM content WHERE id = 66", Some("content")),
            (
                "UPDATE PC SET hidden = 0 WHERE router IN (SELECT IP FROM Router)",
                Some("pc"),
            ),
            ("SELECT * FROM Router", None),
        ];
        for (sql, expected) in cases {
            assert_eq!(
                Command::parse(sql).target_table().as_deref(),
                expected,
                "{sql}"
            );
        }
    }

    #[test]
    fn statement_count_ignores_trailing_semicolons() {
        assert_eq!(Command::parse("SELECT 1;").statement_count(), 1);
        assert_eq!(Command::parse("SELECT 1;; ").statement_count(), 1);
        assert_eq!(Command::parse("SELECT 1; DELETE FROM x").statement_count(), 2);
    }

    #[test]
    fn select_parse_splits_clauses() {
        let command = Command::parse(
            "select id, title from Hints where id > 1 group by title having count(*) > 0 order by id desc limit 3",
        );
        let select = Select::parse(&command).expect("simple select");
        assert_eq!(select.head, "id, title");
        assert_eq!(select.source, "Hints");
        assert_eq!(select.filter.as_deref(), Some("id > 1"));
        assert_eq!(select.group_by.as_deref(), Some("title"));
        assert_eq!(select.having.as_deref(), Some("count(*) > 0"));
        assert_eq!(select.order_by.as_deref(), Some("id desc"));
        assert_eq!(select.limit.as_deref(), Some("3"));
    }

    #[test]
    fn select_parse_rejects_unsupported_shapes() {
        for sql in [
            "SELECT * FROM Hints h JOIN User u ON 1",
            "SELECT * FROM Hints UNION SELECT * FROM Hints",
            "SELECT (SELECT text FROM Hints) FROM User",
            "SELECT * FROM Hints WHERE id IN (SELECT 1)",
            "SELECT * FROM Hints; DELETE FROM Hints",
            "SELECT * FROM Hints WHERE (id = 1",
            "SELECT * FROM Hints ORDER BY id WHERE id = 1",
            "SELECT 1",
        ] {
            assert!(Select::parse(&Command::parse(sql)).is_none(), "{sql}");
        }
    }

    #[test]
    fn source_table_reads_alias() {
        let select = Select::parse(&Command::parse("SELECT h.text FROM Hints AS h")).unwrap();
        let source = select.source_table().unwrap();
        assert_eq!(source.name, "hints");
        assert_eq!(source.qualifier, "h");

        let select = Select::parse(&Command::parse("SELECT * FROM User, Hints")).unwrap();
        assert!(select.source_table().is_none());
    }

    #[test]
    fn and_where_places_predicate_before_order_and_limit() {
        let select =
            Select::parse(&Command::parse("SELECT * FROM Hints ORDER BY id LIMIT 2")).unwrap();
        assert_eq!(
            select.and_where("Hints.id <= 3").render(),
            "SELECT * FROM Hints WHERE Hints.id <= 3 ORDER BY id LIMIT 2"
        );
    }

    #[test]
    fn and_where_wraps_existing_filter() {
        let select =
            Select::parse(&Command::parse("SELECT text FROM Hints WHERE id = 1 OR id = 9"))
                .unwrap();
        assert_eq!(
            select.and_where("Hints.id <= 3").render(),
            "SELECT text FROM Hints WHERE (id = 1 OR id = 9) AND Hints.id <= 3"
        );
    }

    #[test]
    fn and_where_is_idempotent_on_its_own_output() {
        let original = Command::parse("SELECT text FROM Hints WHERE title = 'x' ORDER BY id");
        let once = Select::parse(&original)
            .unwrap()
            .and_where("Hints.id <= 4")
            .render();
        let twice = Select::parse(&Command::parse(&once))
            .unwrap()
            .and_where("Hints.id <= 4")
            .render();
        assert_eq!(once, twice);
    }

    #[test]
    fn and_where_does_not_trust_a_lookalike_suffix() {
        let select =
            Select::parse(&Command::parse("SELECT * FROM Hints WHERE (a) OR (b) AND Hints.id <= 4"))
                .unwrap();
        assert_eq!(
            select.and_where("Hints.id <= 4").filter.as_deref(),
            Some("((a) OR (b) AND Hints.id <= 4) AND Hints.id <= 4")
        );
    }

    #[test]
    fn is_enclosed_checks_the_outer_group() {
        assert!(is_enclosed("(a OR b)"));
        assert!(is_enclosed("((a) OR (b))"));
        assert!(!is_enclosed("(a) OR (b)"));
        assert!(!is_enclosed("a"));
    }
}
