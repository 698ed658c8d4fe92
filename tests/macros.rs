use sedge::{
    CollectingReporter, PPErrorKind, PPToken, Preprocessor, SourceReader, TokenCategory,
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
fn object_like_replacement() {
    let (tokens, reporter) = preprocess("#define N 1\nint x = N;");
    assert!(!reporter.has_errors());
    assert_eq!(significant(&tokens), vec!["int", "x", "=", "1", ";"]);
}

#[test]
fn function_like_with_va_opt() {
    let src = "#define F(...) f(0 __VA_OPT__(,) __VA_ARGS__)\nF()\nF(a,b)";
    let (tokens, reporter) = preprocess(src);
    assert!(!reporter.has_errors());
    assert_eq!(
        significant(&tokens),
        vec!["f", "(", "0", ")", "f", "(", "0", ",", "a", ",", "b", ")"]
    );
}

#[test]
fn stringize() {
    let (tokens, _) = preprocess("#define S(x) #x\nS(hello world)");
    assert_eq!(significant(&tokens), vec!["\"hello world\""]);
    assert_eq!(tokens[1].category, TokenCategory::StringLiteral);
}

#[test]
fn stringize_collapses_interior_whitespace() {
    let (tokens, _) = preprocess("#define S(x) #x\nS(  a    b  )");
    assert_eq!(significant(&tokens), vec!["\"a b\""]);
}

#[test]
fn concatenation_forms_one_identifier() {
    let (tokens, _) = preprocess("#define G(a,b) a##b\nG(foo, 42)");
    assert_eq!(significant(&tokens), vec!["foo42"]);
    assert_eq!(tokens[1].category, TokenCategory::Identifier);
}

#[test]
fn self_reference_is_painted_once() {
    let (tokens, reporter) = preprocess("#define M M+1\nM");
    assert!(!reporter.has_errors());
    assert_eq!(significant(&tokens), vec!["M", "+", "1"]);
    // The surviving M is an ordinary identifier again on output.
    assert_eq!(tokens[1].category, TokenCategory::Identifier);
}

#[test]
fn mutual_recursion_terminates() {
    let (tokens, _) = preprocess("#define A B\n#define B A\nA B");
    assert_eq!(significant(&tokens), vec!["A", "B"]);
}

#[test]
fn benign_redefinition_is_silent() {
    let (_, reporter) = preprocess("#define N 1\n#define N 1\nN");
    assert!(!reporter.has_errors());
    let (_, reporter) = preprocess("#define F(a,b) a+b\n#define F(a,b) a+b\n");
    assert!(!reporter.has_errors());
}

#[test]
fn differing_redefinition_keeps_the_original() {
    let (tokens, reporter) = preprocess("#define N 1\n#define N 2\nN");
    assert_eq!(reporter.error_count(), 1);
    assert_eq!(significant(&tokens), vec!["1"]);
}

#[test]
fn undef_then_plain_identifier() {
    let (tokens, _) = preprocess("#define N 1\n#undef N\nN");
    assert_eq!(significant(&tokens), vec!["N"]);
    // #undef of an unknown name is fine.
    let (_, reporter) = preprocess("#undef NEVER_DEFINED");
    assert!(!reporter.has_errors());
}

#[test]
fn arguments_are_fully_expanded_before_substitution() {
    let src = "#define A B\n#define B 42\n#define ID(x) x\nID(A)";
    let (tokens, _) = preprocess(src);
    assert_eq!(significant(&tokens), vec!["42"]);
}

#[test]
fn stringize_uses_unexpanded_argument() {
    let src = "#define N 1\n#define S(x) #x\nS(N)";
    let (tokens, _) = preprocess(src);
    assert_eq!(significant(&tokens), vec!["\"N\""]);
}

#[test]
fn call_spanning_lines() {
    let (tokens, reporter) = preprocess("#define SUB(a,b) a-b\nSUB(1,\n2)");
    assert!(!reporter.has_errors());
    assert_eq!(significant(&tokens), vec!["1", "-", "2"]);
}

#[test]
fn name_without_parentheses_stays_put() {
    let (tokens, _) = preprocess("#define F(x) x\nint F;");
    assert_eq!(significant(&tokens), vec!["int", "F", ";"]);
}

#[test]
fn expansion_result_calls_into_upstream_tokens() {
    // The call parenthesis arrives from the source, after the expansion.
    let src = "#define CALL F\n#define F(x) x+1\nCALL (2)";
    let (tokens, reporter) = preprocess(src);
    assert!(!reporter.has_errors());
    assert_eq!(significant(&tokens), vec!["2", "+", "1"]);
}

#[test]
fn nested_parentheses_shield_commas() {
    let src = "#define PAIR(x,y) x|y\nPAIR((a,b),c)";
    let (tokens, _) = preprocess(src);
    assert_eq!(
        significant(&tokens),
        vec!["(", "a", ",", "b", ")", "|", "c"]
    );
}

#[test]
fn zero_parameter_macro_with_empty_call() {
    let (tokens, reporter) = preprocess("#define Z() zero\nZ()");
    assert!(!reporter.has_errors());
    assert_eq!(significant(&tokens), vec!["zero"]);
}

#[test]
fn argument_count_mismatch_is_fatal() {
    let mut reporter = CollectingReporter::new();
    let result = Preprocessor::new("test.cpp").run(
        SourceReader::from_text("#define TWO(a,b) a b\nTWO(1)"),
        &mut reporter,
    );
    let err = result.expect_err("argument count mismatch");
    assert!(matches!(err.kind, PPErrorKind::ArgCountMismatch(_)));
}

#[test]
fn invalid_concatenation_is_fatal() {
    let mut reporter = CollectingReporter::new();
    let result = Preprocessor::new("test.cpp").run(
        SourceReader::from_text("#define BAD(a) a##)\nBAD(x) y"),
        &mut reporter,
    );
    let err = result.expect_err("invalid concatenation");
    assert!(matches!(err.kind, PPErrorKind::InvalidTokenConcat(_)));
}

#[test]
fn concat_at_replacement_list_ends_rejected() {
    let (_, reporter) = preprocess("#define BAD ## x\nint y;");
    assert!(reporter
        .diagnostics
        .iter()
        .any(|d| d.kind == PPErrorKind::ConcatAtListEnds));
}

#[test]
fn va_args_outside_variadic_rejected() {
    let (_, reporter) = preprocess("#define F(a) __VA_ARGS__\n");
    assert!(reporter
        .diagnostics
        .iter()
        .any(|d| d.kind == PPErrorKind::VaArgsOutsideVariadic));
}

#[test]
fn variadic_argument_count_floor() {
    // One named parameter plus ...: calling with just the named argument
    // is allowed.
    let (tokens, reporter) = preprocess("#define L(fmt, ...) log(fmt __VA_OPT__(,) __VA_ARGS__)\nL(\"x\")");
    assert!(!reporter.has_errors());
    assert_eq!(significant(&tokens), vec!["log", "(", "\"x\"", ")"]);
}

#[test]
fn expanded_stream_is_idempotent() {
    // Re-preprocessing a fully-expanded stream changes nothing.
    let (tokens, _) = preprocess("#define N 1\n#define G(a,b) a##b\nint G(x,N) = N;");
    let rendered: String = tokens
        .iter()
        .map(|t| {
            if t.category == TokenCategory::Newline {
                "\n".to_owned()
            } else {
                format!("{} ", t.text())
            }
        })
        .collect();
    let (again, _) = preprocess(&rendered);
    assert_eq!(significant(&tokens), significant(&again));
}

#[test]
fn object_like_concat_happens_at_definition() {
    let (tokens, _) = preprocess("#define XY x ## y\nXY");
    assert_eq!(significant(&tokens), vec!["xy"]);
}

#[test]
fn hash_in_object_macro_is_plain_text() {
    // `#` only stringizes in function-like macros.
    let (tokens, reporter) = preprocess("#define H # x\nH");
    assert!(!reporter.has_errors());
    assert_eq!(significant(&tokens), vec!["#", "x"]);
}
