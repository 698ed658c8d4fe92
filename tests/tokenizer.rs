use sedge::{
    CollectingReporter, Lexer, PPToken, Preprocessor, SourceReader, TokenCategory,
};

fn preprocess(src: &str) -> (Vec<PPToken>, CollectingReporter) {
    let mut reporter = CollectingReporter::new();
    let tokens = Preprocessor::new("test.cpp")
        .run(SourceReader::from_text(src), &mut reporter)
        .expect("no fatal error");
    (tokens, reporter)
}

fn significant(tokens: &[PPToken]) -> Vec<String> {
    tokens
        .iter()
        .filter(|t| t.category != TokenCategory::Newline)
        .map(|t| t.text().to_owned())
        .collect()
}

#[test]
fn plain_text_line() {
    let (tokens, reporter) = preprocess("int x = 42;");
    assert!(!reporter.has_errors());
    assert_eq!(significant(&tokens), vec!["int", "x", "=", "42", ";"]);
}

#[test]
fn whitespace_and_comments_vanish_from_output() {
    let (tokens, _) = preprocess("a /* comment */ b // trailing\nc");
    assert_eq!(significant(&tokens), vec!["a", "b", "c"]);
}

#[test]
fn newline_tokens_keep_line_structure() {
    let (tokens, _) = preprocess("a\n\nb");
    let newlines = tokens
        .iter()
        .filter(|t| t.category == TokenCategory::Newline)
        .count();
    assert_eq!(newlines, 3);
}

#[test]
fn lexical_coverage_of_a_logical_line() {
    // Concatenating every token span of a line, whitespace and comments
    // included, reproduces the line exactly.
    let src = "std::vector<int> v{1, 2}; /* tail */";
    let lexer = Lexer::new(SourceReader::from_text(src));
    let rebuilt: String = lexer
        .map(|item| item.expect("tokenizes"))
        .filter(|t| t.category != TokenCategory::Newline)
        .map(|t| t.text().to_owned())
        .collect();
    assert_eq!(rebuilt, src);
}

#[test]
fn operators_longest_match() {
    let (tokens, _) = preprocess("a<=>b<<=c->*d");
    assert_eq!(
        significant(&tokens),
        vec!["a", "<=>", "b", "<<=", "c", "->*", "d"]
    );
}

#[test]
fn digraph_exception_rewrites() {
    // `<:` `:` with more line following re-reads as `<` `::`.
    let (tokens, _) = preprocess("a<::b");
    assert_eq!(significant(&tokens), vec!["a", "<", "::", "b"]);
}

#[test]
fn digraph_bracket_pair_kept() {
    let (tokens, _) = preprocess("a<::>b");
    assert_eq!(significant(&tokens), vec!["a", "<:", ":>", "b"]);
}

#[test]
fn user_defined_literal_glues() {
    let (tokens, _) = preprocess("auto s = \"abc\"sv;");
    let lit = tokens
        .iter()
        .find(|t| t.category == TokenCategory::UdStringLiteral)
        .expect("ud string literal");
    assert_eq!(lit.text(), "\"abc\"sv");

    let (tokens, _) = preprocess("auto c = 'x'_w;");
    let lit = tokens
        .iter()
        .find(|t| t.category == TokenCategory::UdCharLiteral)
        .expect("ud char literal");
    assert_eq!(lit.text(), "'x'_w");
}

#[test]
fn literal_followed_by_spaced_identifier_does_not_glue() {
    let (tokens, _) = preprocess("\"abc\" sv");
    assert_eq!(significant(&tokens), vec!["\"abc\"", "sv"]);
    assert_eq!(tokens[0].category, TokenCategory::StringLiteral);
}

#[test]
fn newline_in_string_reports_and_recovers() {
    let (tokens, reporter) = preprocess("\"open\nnext");
    assert!(reporter.has_errors());
    // The next line still tokenizes.
    assert!(significant(&tokens).contains(&"next".to_owned()));
}

#[test]
fn continuation_splices_identifiers() {
    let (tokens, _) = preprocess("ab\\\ncd = 1;");
    assert_eq!(significant(&tokens), vec!["abcd", "=", "1", ";"]);
}

#[test]
fn token_provenance_maps_to_physical_positions() {
    let (tokens, _) = preprocess("ab\\\ncd xy");
    // "xy" sits on physical line 2 after the splice.
    let xy = tokens.iter().find(|t| t.text() == "xy").expect("token");
    assert_eq!(xy.physical_pos(), (2, 4));
}
