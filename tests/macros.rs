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

#[test]
fn define_registers_a_macro_as_syntax() {
    let interp = interpreter();
    eval(
        &interp,
        "(define unless
           (procedure->macro
             (lambda (_ test . body)
               (list 'if test #f (cons 'begin body)))))",
    );
    assert_eq!(write_str(&eval(&interp, "(unless #f 'yes)")), "yes");
    assert!(matches!(eval(&interp, "(unless #t 'yes)"), Value::Bool(false)));
    // The macro itself is a first-class syntax value bound to its name.
    assert_eq!(write_str(&eval(&interp, "unless")), "#<macro unless>");
}

#[test]
fn transformer_sees_the_whole_unevaluated_call() {
    let interp = interpreter();
    // The head of the call is part of what the transformer receives...
    eval(
        &interp,
        "(define own-name
           (procedure->macro
             (lambda form (list 'quote (car form)))))",
    );
    assert_eq!(write_str(&eval(&interp, "(own-name (+ 1 2) x)")), "own-name");
    // ...and the operands arrive unevaluated.
    eval(
        &interp,
        "(define operand-shapes
           (procedure->macro
             (lambda (_ . operands) (list 'quote operands))))",
    );
    assert_eq!(
        write_str(&eval(&interp, "(operand-shapes (+ 1 2) x)")),
        "((+ 1 2) x)"
    );
}

#[test]
fn expansion_is_cached_per_physical_node() {
    let interp = interpreter();
    eval(&interp, "(define expansions 0)");
    eval(
        &interp,
        "(define twice
           (procedure->macro
             (lambda (_ x)
               (set! expansions (+ expansions 1))
               (list '+ x x))))",
    );
    eval(&interp, "(define (f y) (twice y))");
    assert_int(&eval(&interp, "(f 1)"), 2);
    assert_int(&eval(&interp, "(f 5)"), 10);
    assert_int(&eval(&interp, "(f 21)"), 42);
    // One physical call site, one expansion, no matter how many calls.
    assert_int(&eval(&interp, "expansions"), 1);
}

#[test]
fn distinct_call_sites_expand_independently() {
    let interp = interpreter();
    eval(&interp, "(define expansions 0)");
    eval(
        &interp,
        "(define twice
           (procedure->macro
             (lambda (_ x)
               (set! expansions (+ expansions 1))
               (list '+ x x))))",
    );
    eval(&interp, "(define (f y) (twice y))");
    eval(&interp, "(define (g y) (twice y))");
    assert_int(&eval(&interp, "(+ (f 1) (g 2))"), 6);
    assert_int(&eval(&interp, "(+ (f 3) (g 4))"), 14);
    assert_int(&eval(&interp, "expansions"), 2);
}

#[test]
fn non_pair_expansions_are_cached_as_begin() {
    let interp = interpreter();
    eval(&interp, "(define expansions 0)");
    eval(
        &interp,
        "(define the-answer
           (procedure->macro
             (lambda form
               (set! expansions (+ expansions 1))
               42)))",
    );
    eval(&interp, "(define (ask) (the-answer))");
    assert_int(&eval(&interp, "(ask)"), 42);
    assert_int(&eval(&interp, "(ask)"), 42);
    assert_int(&eval(&interp, "expansions"), 1);
}

#[test]
fn macro_is_usable_immediately_after_its_define() {
    let interp = interpreter();
    assert_int(
        &eval(
            &interp,
            "(begin
               (define id-macro
                 (procedure->macro (lambda (_ x) x)))
               (id-macro 7))",
        ),
        7,
    );
}

#[test]
fn bootstrap_let_is_a_macro_over_lambda() {
    let interp = interpreter();
    assert_eq!(write_str(&eval(&interp, "let")), "#<macro let>");
    assert_int(&eval(&interp, "(let ((x 1) (y 2)) (+ x y))"), 3);
    assert_int(&eval(&interp, "(let ((x 1)) (let ((y (+ x 1))) (* y 10)))"), 20);
    assert_int(&eval(&interp, "(let () 1 2 3)"), 3);
}

#[test]
fn expansion_happens_in_place_inside_loops() {
    let interp = interpreter();
    eval(&interp, "(define expansions 0)");
    eval(
        &interp,
        "(define inc
           (procedure->macro
             (lambda (_ x)
               (set! expansions (+ expansions 1))
               (list '+ x 1))))",
    );
    eval(
        &interp,
        "(define (count n acc)
           (if (= n 0)
               acc
               (count (- n 1) (inc acc))))",
    );
    assert_int(&eval(&interp, "(count 100 0)"), 100);
    assert_int(&eval(&interp, "expansions"), 1);
}

#[test]
fn macro_expanding_to_another_macro_call() {
    let interp = interpreter();
    eval(
        &interp,
        "(define plus-two
           (procedure->macro
             (lambda (_ x) (list '+ 1 (list 'plus-one x)))))",
    );
    eval(
        &interp,
        "(define plus-one
           (procedure->macro
             (lambda (_ x) (list '+ 1 x))))",
    );
    assert_int(&eval(&interp, "(plus-two 40)"), 42);
}
