use skink::printer::write_str;
use skink::runtime::{Config, Interpreter};
use skink::value::Value;

fn interpreter() -> Interpreter {
    Interpreter::with_defaults(Config::default()).expect("bootstrap failed")
}

fn eval(interp: &Interpreter, source: &str) -> Value {
    interp
        .load_str(source)
        .unwrap_or_else(|err| panic!("failed to eval `{}`: {}", source, err))
}

fn assert_int(value: &Value, expected: i64) {
    match value {
        Value::Int(v) => assert_eq!(*v, expected),
        other => panic!("expected Int({}), got {:?}", expected, other),
    }
}

fn assert_bool(value: &Value, expected: bool) {
    match value {
        Value::Bool(v) => assert_eq!(*v, expected),
        other => panic!("expected Bool({}), got {:?}", expected, other),
    }
}

fn assert_written(value: &Value, expected: &str) {
    assert_eq!(write_str(value), expected);
}

#[test]
fn literals_self_evaluate() {
    let interp = interpreter();
    assert_int(&eval(&interp, "42"), 42);
    assert_written(&eval(&interp, "3.5"), "3.5");
    assert_bool(&eval(&interp, "#t"), true);
    assert_written(&eval(&interp, "#\\a"), "#\\a");
    assert_written(&eval(&interp, "\"hello\""), "\"hello\"");
}

#[test]
fn quote_returns_operand_unevaluated() {
    let interp = interpreter();
    assert_written(&eval(&interp, "'(+ 1 2)"), "(+ 1 2)");
    assert_written(&eval(&interp, "(quote x)"), "x");
    assert_written(&eval(&interp, "'()"), "()");
}

#[test]
fn arithmetic() {
    let interp = interpreter();
    assert_int(&eval(&interp, "(+ 1 2 3)"), 6);
    assert_int(&eval(&interp, "(+)"), 0);
    assert_int(&eval(&interp, "(- 10 3 2)"), 5);
    assert_int(&eval(&interp, "(- 4)"), -4);
    assert_int(&eval(&interp, "(* 2 3 4)"), 24);
    assert_int(&eval(&interp, "(quotient 7 2)"), 3);
    assert_int(&eval(&interp, "(remainder 7 2)"), 1);
    assert_written(&eval(&interp, "(+ 1 2.5)"), "3.5");
}

#[test]
fn comparisons() {
    let interp = interpreter();
    assert_bool(&eval(&interp, "(= 2 2 2)"), true);
    assert_bool(&eval(&interp, "(= 2 3)"), false);
    assert_bool(&eval(&interp, "(< 1 2 3)"), true);
    assert_bool(&eval(&interp, "(< 1 3 2)"), false);
    assert_bool(&eval(&interp, "(>= 3 3 2)"), true);
    assert_bool(&eval(&interp, "(< 1 1.5)"), true);
}

#[test]
fn everything_but_false_is_truthy() {
    let interp = interpreter();
    assert_written(&eval(&interp, "(if 0 'a 'b)"), "a");
    assert_written(&eval(&interp, "(if '() 'a 'b)"), "a");
    assert_written(&eval(&interp, "(if \"\" 'a 'b)"), "a");
    assert_written(&eval(&interp, "(if #f 'a 'b)"), "b");
}

#[test]
fn one_armed_if_yields_unspecified_on_false() {
    let interp = interpreter();
    assert_written(&eval(&interp, "(if #f 'x)"), "#<undefined>");
    assert_written(&eval(&interp, "(if #t 'x)"), "x");
}

#[test]
fn begin_sequences_and_returns_last() {
    let interp = interpreter();
    assert_int(&eval(&interp, "(begin 1 2 3)"), 3);
    assert_written(&eval(&interp, "(begin)"), "#<undefined>");
    eval(&interp, "(begin (define x 1) (set! x (+ x 1)))");
    assert_int(&eval(&interp, "x"), 2);
}

#[test]
fn lambda_application() {
    let interp = interpreter();
    assert_int(&eval(&interp, "((lambda (x y) (+ x y)) 3 4)"), 7);
    assert_int(&eval(&interp, "((lambda () 42))"), 42);
}

#[test]
fn define_shorthand_desugars_to_lambda() {
    let interp = interpreter();
    eval(&interp, "(define (add a b) (+ a b))");
    assert_int(&eval(&interp, "(add 1 2)"), 3);
    // The defined closure carries its name for diagnostics.
    assert_written(&eval(&interp, "add"), "#<procedure add>");
}

#[test]
fn variadic_formals() {
    let interp = interpreter();
    assert_written(&eval(&interp, "((lambda args args) 1 2 3)"), "(1 2 3)");
    assert_written(&eval(&interp, "((lambda (a . rest) rest) 1 2 3)"), "(2 3)");
    assert_int(&eval(&interp, "((lambda (a . rest) a) 1)"), 1);
}

#[test]
fn arity_mismatch_is_signalled() {
    let interp = interpreter();
    eval(&interp, "(define (two a b) a)");
    assert!(interp.load_str("(two 1)").is_err());
    assert!(interp.load_str("(two 1 2 3)").is_err());
    assert_int(&eval(&interp, "(two 1 2)"), 1);
}

#[test]
fn set_mutates_nearest_binding() {
    let interp = interpreter();
    eval(&interp, "(define x 1)");
    assert_int(&eval(&interp, "(begin (set! x 2) x)"), 2);
    assert!(interp.load_str("(set! never-defined 1)").is_err());
}

#[test]
fn let_shadows_without_touching_outer_binding() {
    let interp = interpreter();
    eval(&interp, "(define x 99)");
    assert_int(&eval(&interp, "(let ((x 1)) (set! x 2) x)"), 2);
    assert_int(&eval(&interp, "x"), 99);
}

#[test]
fn operands_evaluate_left_to_right() {
    let interp = interpreter();
    eval(&interp, "(define order '())");
    eval(&interp, "(define (effect n) (set! order (cons n order)) n)");
    eval(&interp, "((lambda (a b) 'done) (effect 1) (effect 2))");
    assert_written(&eval(&interp, "order"), "(2 1)");
}

#[test]
fn local_defines_stay_local() {
    let interp = interpreter();
    assert_int(
        &eval(
            &interp,
            "(begin (define (foo x)
                      (define flub x)
                      flub)
                    (foo 44))",
        ),
        44,
    );
    assert!(interp.load_str("flub").is_err());
}

#[test]
fn closures_capture_their_environment() {
    let interp = interpreter();
    eval(&interp, "(define (make-adder n) (lambda (x) (+ x n)))");
    eval(&interp, "(define add5 (make-adder 5))");
    assert_int(&eval(&interp, "(add5 3)"), 8);
    assert_int(&eval(&interp, "((make-adder 10) 3)"), 13);
}

#[test]
fn global_recursion_and_mutual_recursion() {
    let interp = interpreter();
    eval(&interp, "(define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))");
    assert_int(&eval(&interp, "(fact 10)"), 3628800);
    eval(&interp, "(define (is-even n) (if (= n 0) #t (is-odd (- n 1))))");
    eval(&interp, "(define (is-odd n) (if (= n 0) #f (is-even (- n 1))))");
    assert_bool(&eval(&interp, "(is-even 100)"), true);
}

#[test]
fn tail_recursion_is_stack_bounded() {
    let interp = interpreter();
    eval(&interp, "(define (loop n) (if (= n 0) 'done (loop (- n 1))))");
    assert_written(&eval(&interp, "(loop 1000000)"), "done");
}

#[test]
fn operator_position_is_evaluated() {
    let interp = interpreter();
    assert_int(&eval(&interp, "((if #t + *) 2 3)"), 5);
    assert_int(&eval(&interp, "((if #f + *) 2 3)"), 6);
}

#[test]
fn apply_spreads_an_argument_list() {
    let interp = interpreter();
    assert_int(&eval(&interp, "(apply + '(1 2 3))"), 6);
    assert_int(&eval(&interp, "(apply (lambda (a b) (- a b)) '(10 4))"), 6);
}

#[test]
fn applying_a_non_procedure_fails() {
    let interp = interpreter();
    assert!(interp.load_str("(1 2)").is_err());
    assert!(interp.load_str("(\"not a procedure\")").is_err());
}

#[test]
fn conditions_propagate_out_of_operands() {
    let interp = interpreter();
    assert!(interp.load_str("(+ 1 (car '()))").is_err());
}

#[test]
fn bootstrap_list_utilities() {
    let interp = interpreter();
    assert_written(&eval(&interp, "(map (lambda (x) (* x x)) '(1 2 3))"), "(1 4 9)");
    assert_written(&eval(&interp, "(append '(1 2) '(3 4))"), "(1 2 3 4)");
    assert_int(&eval(&interp, "(length '(a b c))"), 3);
    assert_written(&eval(&interp, "(list 1 'two \"three\")"), "(1 two \"three\")");
    assert_int(&eval(&interp, "(cadr '(1 2 3))"), 2);
}

#[test]
fn bootstrap_boolean_forms() {
    let interp = interpreter();
    assert_bool(&eval(&interp, "(and)"), true);
    assert_int(&eval(&interp, "(and 1 2)"), 2);
    assert_bool(&eval(&interp, "(and #f 2)"), false);
    assert_bool(&eval(&interp, "(or)"), false);
    assert_int(&eval(&interp, "(or #f 3)"), 3);
    assert_int(&eval(&interp, "(or 7 9)"), 7);
    assert_bool(&eval(&interp, "(not 3)"), false);
    assert_bool(&eval(&interp, "(not #f)"), true);
    // Short-circuit: the unbound symbol is never evaluated.
    assert_bool(&eval(&interp, "(and #f completely-unbound)"), false);
    assert_bool(&eval(&interp, "(or 1 completely-unbound)"), true);
}

#[test]
fn bootstrap_cond_and_when() {
    let interp = interpreter();
    assert_int(&eval(&interp, "(cond (#f 1) (#t 2) (else 3))"), 2);
    assert_int(&eval(&interp, "(cond (#f 1) (else 3))"), 3);
    assert_written(&eval(&interp, "(cond (#f 1))"), "#<undefined>");
    assert_int(&eval(&interp, "(when #t 1 2)"), 2);
    assert_written(&eval(&interp, "(when #f 1)"), "#<undefined>");
}

#[test]
fn vectors_are_mutable_and_indexable() {
    let interp = interpreter();
    eval(&interp, "(define v (make-vector 3 0))");
    assert_int(&eval(&interp, "(vector-length v)"), 3);
    eval(&interp, "(vector-set! v 1 'x)");
    assert_written(&eval(&interp, "(vector-ref v 1)"), "x");
    assert_written(&eval(&interp, "v"), "#(0 x 0)");
    assert_written(&eval(&interp, "(vector->list #(1 2))"), "(1 2)");
    assert!(interp.load_str("(vector-ref v 9)").is_err());
}

#[test]
fn strings() {
    let interp = interpreter();
    assert_written(&eval(&interp, "(string-append \"foo\" \"bar\")"), "\"foobar\"");
    assert_int(&eval(&interp, "(string-length \"abc\")"), 3);
}

#[test]
fn equivalence_predicates() {
    let interp = interpreter();
    assert_bool(&eval(&interp, "(eq? 'a 'a)"), true);
    assert_bool(&eval(&interp, "(eq? '(1) '(1))"), false);
    assert_bool(&eval(&interp, "(equal? '(1 (2)) '(1 (2)))"), true);
    assert_bool(&eval(&interp, "(eqv? 2 2)"), true);
    assert_bool(&eval(&interp, "(equal? \"ab\" \"ab\")"), true);
}

#[test]
fn pair_mutation() {
    let interp = interpreter();
    eval(&interp, "(define p (cons 1 2))");
    eval(&interp, "(set-car! p 'a)");
    eval(&interp, "(set-cdr! p 'b)");
    assert_written(&eval(&interp, "p"), "(a . b)");
}

#[test]
fn cyclic_structure_is_detected_not_followed() {
    let interp = interpreter();
    eval(&interp, "(define xs (list 1 2))");
    eval(&interp, "(set-cdr! (cdr xs) xs)");
    assert_bool(&eval(&interp, "(list? xs)"), false);
    // Printing must terminate.
    let rendered = write_str(&eval(&interp, "xs"));
    assert!(rendered.contains("..."), "got {}", rendered);
}
