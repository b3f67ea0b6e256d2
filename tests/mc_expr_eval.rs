//! Concrete evaluation of MC expressions.

use bumpalo::Bump;
use dumpexpr::mc::{BinaryOp, GcnSubtarget, McContext, TargetKind, UnaryOp};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn context_for<'a>(arena: &'a Bump, cpu: &str) -> McContext<'a> {
    McContext::with_subtarget(arena, GcnSubtarget::from_cpu(cpu).unwrap())
}

#[test]
fn test_align_to() {
    init_logging();
    let arena = Bump::new();
    let ctx = McContext::new(&arena);

    let aligned = ctx.create_align_to(ctx.constant(13), ctx.constant(8));
    assert_eq!(ctx.evaluate_as_absolute(aligned), Some(16));
    let aligned = ctx.create_align_to(ctx.constant(16), ctx.constant(8));
    assert_eq!(ctx.evaluate_as_absolute(aligned), Some(16));
    let aligned = ctx.create_align_to(ctx.constant(16), ctx.constant(0));
    assert_eq!(ctx.evaluate_as_absolute(aligned), None);
}

#[test]
fn test_reductions() {
    init_logging();
    let arena = Bump::new();
    let ctx = McContext::new(&arena);

    let or = ctx.create_or(&[ctx.constant(1), ctx.constant(2), ctx.constant(4)]);
    assert_eq!(ctx.evaluate_as_absolute(or), Some(7));
    let max = ctx.create_max(&[ctx.constant(3), ctx.constant(-5), ctx.constant(10)]);
    assert_eq!(ctx.evaluate_as_absolute(max), Some(10));
    let single = ctx.create_max(&[ctx.constant(-5)]);
    assert_eq!(ctx.evaluate_as_absolute(single), Some(-5));
}

#[test]
fn test_unresolved_propagates_until_defined() {
    init_logging();
    let arena = Bump::new();
    let ctx = McContext::new(&arena);

    let num_vgpr = ctx.symbol_ref("kernel.num_vgpr");
    let aligned = ctx.create_align_to(num_vgpr, ctx.constant(8));
    let expr = ctx.binary(BinaryOp::Add, aligned, ctx.constant(1));
    assert_eq!(ctx.evaluate_as_absolute(expr), None);
    assert_eq!(ctx.print_value(expr), "alignto(kernel.num_vgpr, 8)+1");

    let max = ctx.create_max(&[ctx.constant(100), num_vgpr]);
    assert_eq!(ctx.evaluate_as_absolute(max), None);

    ctx.define("kernel.num_vgpr", ctx.constant(13));
    assert_eq!(ctx.evaluate_as_absolute(expr), Some(17));
    assert_eq!(ctx.print_value(expr), "17");
    assert_eq!(ctx.evaluate_as_absolute(max), Some(100));
    assert!(ctx.lookup_symbol("kernel.num_vgpr").unwrap().is_used());
}

#[test]
fn test_symbol_chains_and_cycles() {
    init_logging();
    let arena = Bump::new();
    let ctx = McContext::new(&arena);

    ctx.parse_definition("a = b + 1").unwrap();
    ctx.parse_definition("b = c * 2").unwrap();
    let a = ctx.symbol_ref("a");
    assert_eq!(ctx.evaluate_as_absolute(a), None);
    ctx.parse_definition("c = 20").unwrap();
    assert_eq!(ctx.evaluate_as_absolute(a), Some(41));

    ctx.parse_definition("c = a").unwrap();
    assert_eq!(ctx.evaluate_as_absolute(a), None);
    ctx.parse_definition("c = 1").unwrap();
    assert_eq!(ctx.evaluate_as_absolute(a), Some(3));
}

#[test]
fn test_binary_semantics() {
    init_logging();
    let arena = Bump::new();
    let ctx = McContext::new(&arena);
    let eval = |text: &str| ctx.evaluate_as_absolute(ctx.parse_expr(text).unwrap());

    assert_eq!(eval("7 / 0"), None);
    assert_eq!(eval("7 % 0"), None);
    assert_eq!(eval("(0 - 0x7fffffffffffffff - 1) / -1"), Some(i64::MIN));
    assert_eq!(eval("-7 / 2"), Some(-3));
    assert_eq!(eval("-7 % 2"), Some(-1));
    assert_eq!(eval("1 << 64"), Some(0));
    assert_eq!(eval("1 << -1"), Some(0));
    assert_eq!(eval("-1 >>> 64"), Some(0));
    assert_eq!(eval("-16 >> 70"), Some(-1));
    assert_eq!(eval("16 >> 70"), Some(0));
    assert_eq!(eval("0x7fffffffffffffff + 1"), Some(i64::MIN));
    assert_eq!(eval("3 < 4 && 4 <= 4 && 5 > 4 && 4 >= 4 && 3 != 4"), Some(1));
    assert_eq!(eval("-1 < 0"), Some(1));
    assert_eq!(eval("2 || 0"), Some(1));
    assert_eq!(eval("!2"), Some(0));
    assert_eq!(eval("~5 ^ 3"), Some(-7));
    assert_eq!(eval("+5"), Some(5));
}

#[test]
fn test_extra_sgprs() {
    init_logging();
    let arena = Bump::new();
    let ctx = context_for(&arena, "gfx900");

    let vcc = ctx.symbol_ref("vcc_used");
    let flat = ctx.symbol_ref("flat_scr_used");
    let extra = ctx.create_extra_sgprs(vcc, flat, true);
    assert_eq!(ctx.evaluate_as_absolute(extra), None);
    assert_eq!(extra.to_string(), "extrasgprs(vcc_used, flat_scr_used, 1)");

    ctx.define("vcc_used", ctx.constant(1));
    ctx.define("flat_scr_used", ctx.constant(0));
    assert_eq!(ctx.evaluate_as_absolute(extra), Some(4));
    ctx.define("flat_scr_used", ctx.constant(1));
    assert_eq!(ctx.evaluate_as_absolute(extra), Some(6));

    let no_xnack = ctx.create_extra_sgprs(ctx.constant(1), ctx.constant(0), false);
    assert_eq!(ctx.evaluate_as_absolute(no_xnack), Some(2));

    let arena = Bump::new();
    let gfx1030 = context_for(&arena, "gfx1030");
    let extra = gfx1030.create_extra_sgprs(gfx1030.constant(1), gfx1030.constant(1), true);
    assert_eq!(gfx1030.evaluate_as_absolute(extra), Some(2));

    let arena = Bump::new();
    let gfx700 = context_for(&arena, "gfx700");
    let extra = gfx700.create_extra_sgprs(gfx700.constant(0), gfx700.constant(1), false);
    assert_eq!(gfx700.evaluate_as_absolute(extra), Some(4));
}

#[test]
fn test_total_num_vgprs() {
    init_logging();

    let arena = Bump::new();
    let gfx90a = context_for(&arena, "gfx90a");
    let total = gfx90a.create_total_num_vgprs(gfx90a.constant(3), gfx90a.constant(10));
    assert_eq!(gfx90a.evaluate_as_absolute(total), Some(15));
    let total = gfx90a.create_total_num_vgprs(gfx90a.constant(0), gfx90a.constant(10));
    assert_eq!(gfx90a.evaluate_as_absolute(total), Some(10));

    let arena = Bump::new();
    let gfx900 = context_for(&arena, "gfx900");
    let total = gfx900.create_total_num_vgprs(gfx900.constant(3), gfx900.constant(10));
    assert_eq!(gfx900.evaluate_as_absolute(total), Some(10));
    let total = gfx900.create_total_num_vgprs(gfx900.constant(30), gfx900.constant(10));
    assert_eq!(gfx900.evaluate_as_absolute(total), Some(30));
}

#[test]
fn test_occupancy() {
    init_logging();

    let arena = Bump::new();
    let ctx = context_for(&arena, "gfx900");
    let sgprs = ctx.symbol_ref("sgprs");
    let vgprs = ctx.symbol_ref("vgprs");
    let occupancy = ctx.create_occupancy(10, sgprs, vgprs);
    assert_eq!(ctx.evaluate_as_absolute(occupancy), None);

    ctx.define("sgprs", ctx.constant(0));
    ctx.define("vgprs", ctx.constant(0));
    assert_eq!(ctx.evaluate_as_absolute(occupancy), Some(10));
    ctx.define("sgprs", ctx.constant(96));
    assert_eq!(ctx.evaluate_as_absolute(occupancy), Some(8));
    ctx.define("vgprs", ctx.constant(33));
    assert_eq!(ctx.evaluate_as_absolute(occupancy), Some(7));

    let arena = Bump::new();
    let ctx = context_for(&arena, "gfx1030");
    let occupancy = ctx.create_occupancy(16, ctx.constant(200), ctx.constant(100));
    assert_eq!(ctx.evaluate_as_absolute(occupancy), Some(9));
    assert_eq!(
        occupancy.to_string(),
        "occupancy(16, 8, 1024, 8, 16, 200, 100)"
    );
}

#[test]
fn test_hand_built_occupancy_with_unknown_parameter() {
    init_logging();
    let arena = Bump::new();
    let ctx = McContext::new(&arena);

    let mut args: Vec<_> = [10, 4, 256, 7, 10, 0, 0].iter().map(|&v| ctx.constant(v)).collect();
    let complete = ctx.target(TargetKind::Occupancy, &args);
    assert_eq!(ctx.evaluate_as_absolute(complete), Some(10));

    args[1] = ctx.symbol_ref("granule");
    let broken = ctx.target(TargetKind::Occupancy, &args);
    assert_eq!(ctx.evaluate_as_absolute(broken), None);
    ctx.define("granule", ctx.constant(4));
    assert_eq!(ctx.evaluate_as_absolute(broken), Some(10));
}

#[test]
fn test_used_flags() {
    init_logging();
    let arena = Bump::new();
    let ctx = McContext::new(&arena);

    let expr = ctx.parse_expr("x + y * 0").unwrap();
    let x = ctx.lookup_symbol("x").unwrap();
    let y = ctx.lookup_symbol("y").unwrap();
    assert!(!x.is_used() && !y.is_used());

    // Folding only peeks at definitions.
    ctx.define("x", ctx.constant(1));
    ctx.define("y", ctx.constant(2));
    ctx.try_fold(expr);
    assert!(!x.is_used() && !y.is_used());

    assert_eq!(ctx.evaluate_as_absolute(expr), Some(1));
    assert!(x.is_used() && y.is_used());

    let z = ctx.parse_expr("-(z)").unwrap();
    ctx.visit_used(z);
    assert!(ctx.lookup_symbol("z").unwrap().is_used());
}

#[test]
fn test_printing() {
    init_logging();
    let arena = Bump::new();
    let ctx = McContext::new(&arena);

    let x = ctx.symbol_ref("x");
    let sum = ctx.binary(BinaryOp::Add, x, ctx.constant(-4));
    let product = ctx.binary(BinaryOp::Mul, sum, ctx.constant(3));
    assert_eq!(product.to_string(), "(x+(-4))*3");
    let not = ctx.unary(UnaryOp::Not, product);
    assert_eq!(not.to_string(), "~((x+(-4))*3)");
    let shifts = ctx.binary(
        BinaryOp::LShr,
        ctx.binary(BinaryOp::AShr, x, ctx.constant(1)),
        ctx.constant(2),
    );
    assert_eq!(shifts.to_string(), "(x>>1)>>>2");

    ctx.define("x", ctx.constant(6));
    assert_eq!(ctx.print_value(product), "6");
    assert_eq!(ctx.print_value(not), "-7");
}

#[test]
fn test_stats() {
    init_logging();
    let arena = Bump::new();
    let ctx = McContext::new(&arena);

    ctx.parse_expr("a + b + 1").unwrap();
    let stats = ctx.stats();
    assert_eq!(stats.symbols_created, 2);
    assert_eq!(stats.nodes_created, 5);
    assert_eq!(stats.to_string(), "5 nodes, 2 symbols, 0 folds");
}

#[test]
fn test_negative_and_wrapping_register_counts() {
    init_logging();
    let arena = Bump::new();
    let ctx = context_for(&arena, "gfx900");

    // -1 VGPRs is u32::MAX registers per wave: a single wave at most.
    let occupancy = ctx.create_occupancy(10, ctx.constant(0), ctx.constant(-1));
    assert_eq!(ctx.evaluate_as_absolute(occupancy), Some(1));
    assert_eq!(ctx.try_fold(occupancy).as_constant(), Some(1));

    let vgprs = ctx.symbol_ref("vgprs");
    let occupancy = ctx.create_occupancy(10, ctx.constant(0), vgprs);
    ctx.parse_definition("vgprs = -1").unwrap();
    assert_eq!(ctx.evaluate_as_absolute(occupancy), Some(1));

    let eval = |text: &str| ctx.evaluate_as_absolute(ctx.parse_expr(text).unwrap());
    assert_eq!(
        eval("occupancy(10, 4, 256, 7, 10, 0, 0xfffffffffffffffe)"),
        Some(1)
    );
    // Only the low 32 bits of a register count take part.
    assert_eq!(eval("occupancy(10, 4, 256, 7, 10, 0, 0x100000000)"), Some(10));
    assert_eq!(eval("occupancy(10, 4, 256, 7, 10, -1, 0)"), Some(7));

    // Unsigned maximum without the unified register file.
    assert_eq!(eval("totalnumvgprs(-1, 10)"), Some(-1));
    assert_eq!(eval("alignto(-5, 4)"), Some(-4));
    assert_eq!(eval("alignto(-1, 8)"), Some(0));
    assert_eq!(eval("alignto(5, -1)"), Some(0));
    assert_eq!(eval("alignto(0x7fffffffffffffff, 16)"), Some(i64::MIN));

    let arena = Bump::new();
    let gfx90a = context_for(&arena, "gfx90a");
    let total = gfx90a.create_total_num_vgprs(gfx90a.constant(3), gfx90a.constant(-1));
    assert_eq!(gfx90a.evaluate_as_absolute(total), Some(3));
    let total = gfx90a.create_total_num_vgprs(gfx90a.constant(-1), gfx90a.constant(10));
    assert_eq!(gfx90a.evaluate_as_absolute(total), Some(11));
}
