//! Minimal WASM resolver engine fixture, compiled in-process from WAT so
//! tests don't need to ship a prebuilt `.wasm` binary.
//!
//! It implements the full exported ABI surface but ignores request
//! content: `set_resolver_state` always reports success, and
//! `resolve_with_sticky` always answers with a fixed `Success` resolution
//! for a flag named `bool-flag` (variant `on`, value `true`, reason
//! `MATCH`). `bounded_flush_logs`/`bounded_flush_assign` always report "no
//! batch" (pointer `0`).

const FIXTURE_WAT: &str = r#"(module
  (import "env" "current_time" (func $current_time (result i32)))
  (memory (export "memory") 2)
  (global $bump (mut i32) (i32.const 560))
  (func (export "alloc") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $bump))
    (global.set $bump (i32.add (global.get $bump) (local.get $len)))
    (local.get $ptr))
  (func (export "free") (param $ptr i32))
  (func (export "set_resolver_state") (param $req i32) (result i32)
    (i32.const 12))
  (func (export "resolve_with_sticky") (param $req i32) (result i32)
    (i32.const 68))
  (func (export "bounded_flush_logs") (result i32)
    (i32.const 0))
  (func (export "bounded_flush_assign") (result i32)
    (i32.const 0))
  (data (i32.const 8) "\1e\00\00\00\7b\22\64\61\74\61\22\3a\5b\31\31\30\2c\31\31\37\2c\31\30\38\2c\31\30\38\5d\7d")
  (data (i32.const 64) "\d9\01\00\00\7b\22\64\61\74\61\22\3a\5b\31\32\33\2c\33\34\2c\31\30\37\2c\31\30\35\2c\31\31\30\2c\31\30\30\2c\33\34\2c\35\38\2c\33\34\2c\38\33\2c\31\31\37\2c\39\39\2c\39\39\2c\31\30\31\2c\31\31\35\2c\31\31\35\2c\33\34\2c\34\34\2c\33\34\2c\31\31\34\2c\31\30\31\2c\31\31\35\2c\31\31\31\2c\31\30\38\2c\31\31\38\2c\31\30\31\2c\31\30\30\2c\37\30\2c\31\30\38\2c\39\37\2c\31\30\33\2c\31\31\35\2c\33\34\2c\35\38\2c\39\31\2c\31\32\33\2c\33\34\2c\31\30\32\2c\31\30\38\2c\39\37\2c\31\30\33\2c\33\34\2c\35\38\2c\33\34\2c\39\38\2c\31\31\31\2c\31\31\31\2c\31\30\38\2c\34\35\2c\31\30\32\2c\31\30\38\2c\39\37\2c\31\30\33\2c\33\34\2c\34\34\2c\33\34\2c\31\31\38\2c\39\37\2c\31\31\34\2c\31\30\35\2c\39\37\2c\31\31\30\2c\31\31\36\2c\33\34\2c\35\38\2c\33\34\2c\31\31\31\2c\31\31\30\2c\33\34\2c\34\34\2c\33\34\2c\31\31\38\2c\39\37\2c\31\30\38\2c\31\31\37\2c\31\30\31\2c\33\34\2c\35\38\2c\31\31\36\2c\31\31\34\2c\31\31\37\2c\31\30\31\2c\34\34\2c\33\34\2c\31\31\34\2c\31\30\31\2c\39\37\2c\31\31\35\2c\31\31\31\2c\31\31\30\2c\33\34\2c\35\38\2c\33\34\2c\37\37\2c\36\35\2c\38\34\2c\36\37\2c\37\32\2c\33\34\2c\31\32\35\2c\39\33\2c\34\34\2c\33\34\2c\31\30\39\2c\39\37\2c\31\31\36\2c\31\30\31\2c\31\31\34\2c\31\30\35\2c\39\37\2c\31\30\38\2c\31\30\35\2c\31\32\32\2c\39\37\2c\31\31\36\2c\31\30\35\2c\31\31\31\2c\31\31\30\2c\38\35\2c\31\31\32\2c\31\30\30\2c\39\37\2c\31\31\36\2c\31\30\31\2c\31\31\35\2c\33\34\2c\35\38\2c\39\31\2c\39\33\2c\31\32\35\5d\7d")
)
"#;

pub fn fixture_module() -> Vec<u8> {
    wat::parse_str(FIXTURE_WAT).expect("fixture WAT must parse")
}
