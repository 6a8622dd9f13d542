use expect_test::expect;
use spooky::bytecode::disasm::render;
use spooky::bytecode::{CodegenOptions, Executable};
use spooky::ir::GenErrorKind;
use spooky::lang::{
    BinaryOperator, CompoundOperator, Expr, FuncDecl, Function, Stmt, Type, TypedProgram,
    UnaryOperator, VarDecl,
};
use spooky::runtime::{SharedOutput, Vm, VmError};
use spooky::{CompileError, compile};

// ============================================================
// Test Helpers
// ============================================================

fn program(functions: Vec<Function>) -> TypedProgram {
    let mut program = TypedProgram::new()
        .extern_fn(FuncDecl::new("print", Type::Void).param("c", Type::Char))
        .extern_fn(FuncDecl::new("printInt", Type::Void).param("value", Type::Int))
        .extern_fn(FuncDecl::new("random", Type::Int));
    for function in functions {
        program = program.function(function);
    }
    program
}

fn main_fn(body: Vec<Stmt>) -> Function {
    FuncDecl::new("main", Type::Void).body(body)
}

fn print_int(value: Expr) -> Stmt {
    Stmt::expr(Expr::call("printInt", vec![value]))
}

fn print_char(c: u8) -> Stmt {
    Stmt::expr(Expr::call("print", vec![Expr::char(c)]))
}

fn bin(op: BinaryOperator, lhs: Expr, rhs: Expr) -> Expr {
    Expr::binary(op, lhs, rhs)
}

fn build(program: &TypedProgram, optimize: bool) -> Executable {
    compile("test", program, &CodegenOptions { optimize }).expect("program should compile")
}

fn execute(program: &TypedProgram, optimize: bool) -> (Result<(), VmError>, String) {
    let out = SharedOutput::new();
    let mut vm = Vm::builder(build(program, optimize))
        .std_lib(out.clone())
        .max_steps(100_000)
        .build();
    let result = vm.run();
    (result, out.contents())
}

/// Run with and without the peephole pass and compare against `expected`
fn assert_output(program: TypedProgram, expected: &str) {
    for optimize in [false, true] {
        let (result, output) = execute(&program, optimize);
        assert_eq!(result, Ok(()), "optimize={}", optimize);
        assert_eq!(output, expected, "optimize={}", optimize);
    }
}

fn assert_fault(program: TypedProgram, expected: VmError) {
    for optimize in [false, true] {
        let (result, _) = execute(&program, optimize);
        assert_eq!(result, Err(expected.clone()), "optimize={}", optimize);
    }
}

fn assert_compile_error(program: TypedProgram, expected: GenErrorKind) {
    match compile("test", &program, &CodegenOptions::default()) {
        Err(CompileError::Gen(e)) => assert_eq!(e.kind, expected),
        other => panic!("expected {:?}, got {:?}", expected, other),
    }
}

// ============================================================
// Basics
// ============================================================

#[test]
fn test_print_literal() {
    assert_output(program(vec![main_fn(vec![print_int(Expr::int(42))])]), "42");
}

#[test]
fn test_print_chars() {
    assert_output(
        program(vec![main_fn(vec![print_char(b'h'), print_char(b'i')])]),
        "hi",
    );
}

#[test]
fn test_arithmetic_precedence_is_tree_shaped() {
    // (2 + 3) * 4 - 10 / 3
    let expr = bin(
        BinaryOperator::Sub,
        bin(
            BinaryOperator::Mul,
            bin(BinaryOperator::Add, Expr::int(2), Expr::int(3)),
            Expr::int(4),
        ),
        bin(BinaryOperator::Div, Expr::int(10), Expr::int(3)),
    );
    assert_output(program(vec![main_fn(vec![print_int(expr)])]), "17");
}

#[test]
fn test_negative_and_modulo() {
    let body = vec![
        print_int(Expr::unary(UnaryOperator::Negate, Expr::int(5))),
        print_char(b' '),
        print_int(bin(BinaryOperator::Mod, Expr::int(-7), Expr::int(3))),
    ];
    assert_output(program(vec![main_fn(body)]), "-5 -1");
}

#[test]
fn test_bitwise_operators() {
    let body = vec![
        print_int(bin(BinaryOperator::BitAnd, Expr::int(12), Expr::int(10))),
        print_char(b' '),
        print_int(bin(BinaryOperator::BitOr, Expr::int(12), Expr::int(3))),
    ];
    assert_output(program(vec![main_fn(body)]), "8 15");
}

#[test]
fn test_division_by_zero_faults() {
    let body = vec![print_int(bin(BinaryOperator::Mod, Expr::int(5), Expr::int(0)))];
    assert_fault(program(vec![main_fn(body)]), VmError::DivisionByZero);
}

#[test]
fn test_output_before_fault_is_kept() {
    let body = vec![
        print_int(Expr::int(1)),
        print_int(bin(BinaryOperator::Div, Expr::int(1), Expr::int(0))),
        print_int(Expr::int(2)),
    ];
    let (result, output) = execute(&program(vec![main_fn(body)]), false);
    assert_eq!(result, Err(VmError::DivisionByZero));
    assert_eq!(output, "1");
}

// ============================================================
// Variables
// ============================================================

#[test]
fn test_globals_initialised_before_main() {
    let program = program(vec![main_fn(vec![
        Stmt::expr(Expr::compound(
            CompoundOperator::Add,
            Expr::var("g"),
            Expr::int(2),
        )),
        print_int(Expr::var("g")),
    ])])
    .global(VarDecl::new("g", Type::Int, Expr::int(5)));
    assert_output(program, "7");
}

#[test]
fn test_global_initialiser_reads_earlier_global() {
    let program = program(vec![main_fn(vec![print_int(Expr::var("b"))])])
        .global(VarDecl::new("a", Type::Int, Expr::int(4)))
        .global(VarDecl::new(
            "b",
            Type::Int,
            bin(BinaryOperator::Mul, Expr::var("a"), Expr::int(3)),
        ));
    assert_output(program, "12");
}

#[test]
fn test_compound_assignment_operand_order() {
    let body = vec![
        Stmt::var("x", Type::Int, Expr::int(10)),
        Stmt::expr(Expr::compound(
            CompoundOperator::Sub,
            Expr::var("x"),
            Expr::int(3),
        )),
        print_int(Expr::var("x")),
    ];
    assert_output(program(vec![main_fn(body)]), "7");
}

#[test]
fn test_assignment_is_an_expression() {
    let body = vec![
        Stmt::var("x", Type::Int, Expr::int(0)),
        print_int(Expr::assign(Expr::var("x"), Expr::int(9))),
        print_int(Expr::var("x")),
    ];
    assert_output(program(vec![main_fn(body)]), "99");
}

#[test]
fn test_inner_scope_shadows() {
    let body = vec![
        Stmt::var("x", Type::Int, Expr::int(1)),
        Stmt::block(vec![
            Stmt::var("x", Type::Int, Expr::int(2)),
            print_int(Expr::var("x")),
        ]),
        print_int(Expr::var("x")),
    ];
    assert_output(program(vec![main_fn(body)]), "21");
}

#[test]
fn test_increment_forms() {
    let body = vec![
        Stmt::var("i", Type::Int, Expr::int(5)),
        print_int(Expr::unary(UnaryOperator::PostIncrement, Expr::var("i"))),
        print_int(Expr::unary(UnaryOperator::PreIncrement, Expr::var("i"))),
        print_int(Expr::unary(UnaryOperator::PreDecrement, Expr::var("i"))),
        print_int(Expr::var("i")),
    ];
    assert_output(program(vec![main_fn(body)]), "5766");
}

// ============================================================
// Control flow
// ============================================================

#[test]
fn test_for_loop() {
    let body = vec![Stmt::for_loop(
        Some(Stmt::var("i", Type::Int, Expr::int(0))),
        Some(bin(BinaryOperator::Less, Expr::var("i"), Expr::int(3))),
        Some(Stmt::expr(Expr::unary(
            UnaryOperator::PostIncrement,
            Expr::var("i"),
        ))),
        print_int(Expr::var("i")),
    )];
    assert_output(program(vec![main_fn(body)]), "012");
}

#[test]
fn test_while_loop_sums() {
    let body = vec![
        Stmt::var("n", Type::Int, Expr::int(4)),
        Stmt::var("sum", Type::Int, Expr::int(0)),
        Stmt::while_loop(
            bin(BinaryOperator::Greater, Expr::var("n"), Expr::int(0)),
            Stmt::block(vec![
                Stmt::expr(Expr::compound(
                    CompoundOperator::Add,
                    Expr::var("sum"),
                    Expr::var("n"),
                )),
                Stmt::expr(Expr::unary(UnaryOperator::PostDecrement, Expr::var("n"))),
            ]),
        ),
        print_int(Expr::var("sum")),
    ];
    assert_output(program(vec![main_fn(body)]), "10");
}

#[test]
fn test_if_else() {
    let branch = |value: i32| {
        Stmt::if_else(
            bin(BinaryOperator::GreaterEq, Expr::int(value), Expr::int(3)),
            print_char(b'y'),
            Some(print_char(b'n')),
        )
    };
    assert_output(
        program(vec![main_fn(vec![branch(2), branch(3), branch(4)])]),
        "nyy",
    );
}

#[test]
fn test_logical_ops_and_ternary() {
    let in_range = |x: i32| {
        Expr::ternary(
            bin(
                BinaryOperator::And,
                bin(BinaryOperator::Greater, Expr::int(x), Expr::int(5)),
                bin(BinaryOperator::Less, Expr::int(x), Expr::int(10)),
            ),
            Expr::int(1),
            Expr::int(0),
        )
    };
    let either = bin(
        BinaryOperator::Or,
        Expr::bool(false),
        Expr::unary(UnaryOperator::Not, Expr::bool(false)),
    );
    let body = vec![
        print_int(in_range(7)),
        print_int(in_range(12)),
        print_int(Expr::ternary(either, Expr::int(1), Expr::int(0))),
    ];
    assert_output(program(vec![main_fn(body)]), "101");
}

#[test]
fn test_char_comparison() {
    let body = vec![Stmt::if_else(
        bin(BinaryOperator::Less, Expr::char(b'a'), Expr::char(b'b')),
        print_char(b'<'),
        None,
    )];
    assert_output(program(vec![main_fn(body)]), "<");
}

#[test]
fn test_early_return_from_main_halts() {
    let body = vec![
        print_int(Expr::int(1)),
        Stmt::ret(None),
        print_int(Expr::int(2)),
    ];
    assert_output(program(vec![main_fn(body)]), "1");
}

#[test]
fn test_infinite_loop_hits_step_limit() {
    let body = vec![Stmt::while_loop(Expr::bool(true), Stmt::block(vec![]))];
    assert_fault(
        program(vec![main_fn(body)]),
        VmError::StepLimitExceeded { limit: 100_000 },
    );
}

// ============================================================
// Functions
// ============================================================

fn square() -> Function {
    FuncDecl::new("square", Type::Int)
        .param("x", Type::Int)
        .body(vec![Stmt::ret(Some(bin(
            BinaryOperator::Mul,
            Expr::var("x"),
            Expr::var("x"),
        )))])
}

#[test]
fn test_call_returns_value() {
    let three = FuncDecl::new("three", Type::Int).body(vec![Stmt::ret(Some(Expr::int(3)))]);
    assert_output(
        program(vec![
            three,
            main_fn(vec![print_int(Expr::call("three", vec![]))]),
        ]),
        "3",
    );
}

#[test]
fn test_repeated_calls_resume_correctly() {
    let body = vec![
        print_int(Expr::call("square", vec![Expr::int(1)])),
        print_int(Expr::call("square", vec![Expr::int(2)])),
    ];
    assert_output(program(vec![main_fn(body), square()]), "14");
}

#[test]
fn test_nested_calls() {
    let inner = Expr::call("square", vec![Expr::int(2)]);
    let body = vec![print_int(Expr::call("square", vec![inner]))];
    assert_output(program(vec![square(), main_fn(body)]), "16");
}

#[test]
fn test_parameter_order() {
    let sub = FuncDecl::new("sub", Type::Int)
        .param("a", Type::Int)
        .param("b", Type::Int)
        .body(vec![Stmt::ret(Some(bin(
            BinaryOperator::Sub,
            Expr::var("a"),
            Expr::var("b"),
        )))]);
    let body = vec![print_int(Expr::call("sub", vec![Expr::int(10), Expr::int(3)]))];
    assert_output(program(vec![sub, main_fn(body)]), "7");
}

#[test]
fn test_void_function_with_locals() {
    let shout = FuncDecl::new("shout", Type::Void)
        .param("c", Type::Char)
        .body(vec![
            Stmt::var("times", Type::Int, Expr::int(2)),
            Stmt::while_loop(
                bin(BinaryOperator::Greater, Expr::var("times"), Expr::int(0)),
                Stmt::block(vec![
                    Stmt::expr(Expr::call("print", vec![Expr::var("c")])),
                    Stmt::expr(Expr::unary(
                        UnaryOperator::PostDecrement,
                        Expr::var("times"),
                    )),
                ]),
            ),
        ]);
    let body = vec![
        Stmt::expr(Expr::call("shout", vec![Expr::char(b'a')])),
        Stmt::expr(Expr::call("shout", vec![Expr::char(b'b')])),
    ];
    assert_output(program(vec![shout, main_fn(body)]), "aabb");
}

fn factorial() -> Function {
    let n = || Expr::var("n");
    FuncDecl::new("fact", Type::Int)
        .param("n", Type::Int)
        .body(vec![
            Stmt::if_else(
                bin(BinaryOperator::LessEq, n(), Expr::int(1)),
                Stmt::ret(Some(Expr::int(1))),
                None,
            ),
            Stmt::ret(Some(bin(
                BinaryOperator::Mul,
                n(),
                Expr::call("fact", vec![bin(BinaryOperator::Sub, n(), Expr::int(1))]),
            ))),
        ])
}

#[test]
fn test_recursive_factorial() {
    let body = vec![print_int(Expr::call("fact", vec![Expr::int(5)]))];
    assert_output(program(vec![factorial(), main_fn(body)]), "120");
}

#[test]
fn test_stack_pointer_stays_above_reserved_cells() {
    let nested = Expr::call("square", vec![Expr::call("square", vec![Expr::int(2)])]);
    let body = vec![
        print_int(Expr::call("fact", vec![Expr::int(6)])),
        print_char(b' '),
        print_int(nested),
    ];
    let program = program(vec![factorial(), square(), main_fn(body)]);

    for optimize in [false, true] {
        let out = SharedOutput::new();
        let mut vm = Vm::builder(build(&program, optimize))
            .std_lib(out.clone())
            .build();
        let mut lowest = i32::MAX;
        loop {
            let running = vm.execute_instruction().unwrap();
            let sp = vm.get(0).unwrap();
            assert!(sp >= 2, "SP {} at ip {:04}, optimize={}", sp, vm.ip(), optimize);
            lowest = lowest.min(sp);
            if !running {
                break;
            }
        }
        assert_eq!(lowest, 2, "optimize={}", optimize);
        assert_eq!(out.contents(), "720 16", "optimize={}", optimize);
    }
}

#[test]
fn test_function_reads_global() {
    let bump = FuncDecl::new("bump", Type::Void).body(vec![Stmt::expr(Expr::compound(
        CompoundOperator::Mul,
        Expr::var("g"),
        Expr::int(2),
    ))]);
    let body = vec![
        Stmt::expr(Expr::call("bump", vec![])),
        Stmt::expr(Expr::call("bump", vec![])),
        print_int(Expr::var("g")),
    ];
    let program = program(vec![bump, main_fn(body)])
        .global(VarDecl::new("g", Type::Int, Expr::int(3)));
    assert_output(program, "12");
}

#[test]
fn test_random_is_deterministic() {
    let body = vec![
        print_int(Expr::call("random", vec![])),
        print_int(Expr::call("random", vec![])),
    ];
    let program = program(vec![main_fn(body)]);
    let (first, a) = execute(&program, false);
    let (second, b) = execute(&program, true);
    assert_eq!(first, Ok(()));
    assert_eq!(second, Ok(()));
    assert!(!a.is_empty());
    assert_eq!(a, b);
}

// ============================================================
// Errors
// ============================================================

#[test]
fn test_missing_main_is_reported() {
    assert_compile_error(program(vec![square()]), GenErrorKind::MissingMain);
}

#[test]
fn test_undefined_variable_is_reported() {
    assert_compile_error(
        program(vec![main_fn(vec![print_int(Expr::var("ghost"))])]),
        GenErrorKind::UndefinedVariable("ghost".into()),
    );
}

#[test]
fn test_missing_extern_faults_at_runtime() {
    let program = TypedProgram::new()
        .extern_fn(FuncDecl::new("beep", Type::Void))
        .function(main_fn(vec![Stmt::expr(Expr::call("beep", vec![]))]));
    let mut vm = Vm::new(build(&program, false));
    assert_eq!(
        vm.run(),
        Err(VmError::UnknownExtern {
            name: "beep".into()
        })
    );
}

// ============================================================
// Executable format
// ============================================================

#[test]
fn test_compiled_executable_survives_bytes() {
    let program = program(vec![square(), main_fn(vec![print_int(Expr::call(
        "square",
        vec![Expr::int(6)],
    ))])]);
    for optimize in [false, true] {
        let exe = build(&program, optimize);
        let decoded = Executable::from_bytes(&exe.to_bytes()).unwrap();
        assert_eq!(decoded, exe);

        let out = SharedOutput::new();
        let mut vm = Vm::builder(decoded).std_lib(out.clone()).build();
        vm.run().unwrap();
        assert_eq!(out.contents(), "36");
    }
}

#[test]
fn test_disasm_of_compiled_program() {
    let program = program(vec![main_fn(vec![print_int(Expr::int(42))])]);
    let exe = compile("hello", &program, &CodegenOptions::default()).unwrap();
    expect![[r#"
        ════════════════════════════════════════
         hello
         8 instructions, 2 data cells
        ════════════════════════════════════════
        0000  CONST 2 -> [0]
        0001  CONST 42 -> [SP+0]
        0002  CONST 1 -> [1]
        0003  ADD [0] [1] -> [0]
        0004  EXTERN printInt
        0005  CONST 1 -> [1]
        0006  SUB [0] [1] -> [0]
        0007  HALT
        data: [0, 1]
    "#]]
    .assert_eq(&render(&exe));
}

#[test]
fn test_optimizer_shrinks_text() {
    let add_to_x = |n: i32| {
        Stmt::expr(Expr::assign(
            Expr::var("x"),
            bin(BinaryOperator::Add, Expr::var("x"), Expr::int(n)),
        ))
    };
    let body = vec![
        Stmt::var("x", Type::Int, Expr::int(3)),
        add_to_x(4),
        add_to_x(5),
        print_int(Expr::var("x")),
    ];
    let program = program(vec![main_fn(body)]);
    let plain = build(&program, false);
    let optimized = build(&program, true);
    assert!(optimized.text().len() < plain.text().len());
    assert!(optimized.data().contains(&4));
    assert_output(program, "12");
}
