use std::panic::{self, AssertUnwindSafe};

use anyhow::bail;
use ndscope::{ArenaError, Buffer, DType, Engine, EngineConfig, Shape, TensorData};

fn vector(engine: &Engine, values: &[f32]) -> Buffer {
    engine
        .from_f32([values.len()], values.to_vec())
        .expect("allocation failed")
}

#[test]
fn scope_without_returns_frees_every_allocation() {
    let engine = Engine::new();
    let before = engine.count();

    let mut allocated = Vec::new();
    engine
        .scope("no-returns", |engine| {
            for i in 0..5 {
                allocated.push(vector(engine, &[i as f32, 1.0]));
            }
            assert_eq!(engine.count(), before + 5);
            Ok(())
        })
        .unwrap();

    assert_eq!(engine.count(), before);
    assert!(allocated.iter().all(Buffer::is_disposed));
}

#[test]
fn returned_buffer_survives_and_belongs_to_parent() {
    let engine = Engine::new();

    let mut inner_result = None;
    engine
        .scope("outer", |engine| {
            let result = engine.scope("inner", |engine| {
                let _scratch = vector(engine, &[9.0]);
                Ok(vector(engine, &[1.0, 2.0]))
            })?;
            assert!(!result.is_disposed());
            assert_eq!(result.to_f32_vec()?, vec![1.0, 2.0]);
            assert_eq!(engine.count(), 1);
            inner_result = Some(result);
            Ok(())
        })
        .unwrap();

    // The outer scope owned the promoted buffer and did not return it.
    let result = inner_result.unwrap();
    assert!(result.is_disposed());
    assert_eq!(engine.count(), 0);
}

#[test]
fn tuple_and_vec_outputs_keep_every_buffer() {
    let engine = Engine::new();
    let (pair, list) = engine
        .scope("collections", |engine| {
            let a = vector(engine, &[1.0]);
            let b = vector(engine, &[2.0]);
            let c = vector(engine, &[3.0]);
            let _dropped = vector(engine, &[4.0]);
            Ok(((a, b), vec![c]))
        })
        .unwrap();

    assert_eq!(engine.count(), 3);
    assert!(!pair.0.is_disposed());
    assert!(!pair.1.is_disposed());
    assert!(!list[0].is_disposed());
}

#[test]
fn kept_buffer_outlives_its_scope() {
    let engine = Engine::new();
    let mut kept = None;
    engine
        .scope("keep", |engine| {
            let buffer = vector(engine, &[5.0]);
            engine.keep(&buffer)?;
            kept = Some(buffer);
            Ok(())
        })
        .unwrap();

    let kept = kept.unwrap();
    assert!(!kept.is_disposed());
    assert_eq!(engine.count(), 1);
}

#[test]
fn explicit_enter_and_exit_honour_keep_set() {
    let engine = Engine::new();
    engine.enter_scope(Some("manual"));
    let a = vector(&engine, &[1.0]);
    let b = vector(&engine, &[2.0]);
    assert_eq!(engine.memory().scope_depth, 1);

    let exit = engine.exit_scope(&[b.clone()]).unwrap();
    assert_eq!(exit.disposed, 1);
    assert_eq!(exit.kept, 1);
    assert!(a.is_disposed());
    assert!(!b.is_disposed());
    assert_eq!(engine.memory().scope_depth, 0);
}

#[test]
fn scope_is_closed_when_body_fails() {
    let engine = Engine::new();
    let mut leaked = None;

    let outcome: anyhow::Result<()> = engine.scope("failing", |engine| {
        leaked = Some(vector(engine, &[1.0, 2.0, 3.0]));
        bail!("kernel exploded");
    });

    assert!(outcome.is_err());
    assert!(leaked.unwrap().is_disposed());
    assert_eq!(engine.count(), 0);
    assert_eq!(engine.memory().scope_depth, 0);
}

#[test]
fn scope_is_closed_when_body_panics() {
    let engine = Engine::new();
    let survivor = vector(&engine, &[7.0]);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = engine.scope("panicking", |engine| -> anyhow::Result<()> {
            vector(engine, &[1.0]);
            vector(engine, &[2.0]);
            panic!("kernel panicked");
        });
    }));

    assert!(outcome.is_err());
    assert_eq!(engine.count(), 1);
    assert_eq!(engine.memory().scope_depth, 0);
    assert!(!survivor.is_disposed());
}

#[test]
fn disposing_twice_is_rejected() {
    let engine = Engine::new();
    let buffer = vector(&engine, &[1.0]);

    engine.dispose(&buffer).unwrap();
    assert_eq!(engine.count(), 0);
    assert_eq!(
        engine.dispose(&buffer),
        Err(ArenaError::DisposedBuffer { id: buffer.id() })
    );
    assert_eq!(engine.count(), 0);
}

#[test]
fn disposed_buffer_rejects_access() {
    let engine = Engine::new();
    let buffer = vector(&engine, &[1.0, 2.0]);
    engine.dispose(&buffer).unwrap();

    let disposed = ArenaError::DisposedBuffer { id: buffer.id() };
    assert_eq!(buffer.data().unwrap_err(), disposed);
    assert_eq!(buffer.to_f32_vec().unwrap_err(), disposed);
    assert_eq!(
        buffer.overwrite(TensorData::from(vec![3.0f32, 4.0])),
        Err(disposed.clone())
    );
    assert_eq!(engine.track(&buffer), Err(disposed.clone()));
    assert_eq!(engine.keep(&buffer), Err(disposed));
}

#[test]
fn strict_engine_requires_an_open_scope() {
    let engine = Engine::with_config(EngineConfig {
        strict_scopes: true,
        ..EngineConfig::default()
    });

    assert_eq!(engine.scalar(1.0).unwrap_err(), ArenaError::NoActiveScope);

    let kept = engine
        .scope("strict", |engine| Ok(engine.scalar(2.0)?))
        .unwrap();
    assert!(!kept.is_disposed());
    assert_eq!(engine.count(), 1);
}

#[test]
fn exiting_without_open_scope_fails() {
    let engine = Engine::new();
    let top_level = vector(&engine, &[1.0]);
    assert_eq!(engine.exit_scope(&[]), Err(ArenaError::NoActiveScope));
    assert!(!top_level.is_disposed());
}

#[test]
fn buffers_built_outside_the_engine_can_be_tracked() {
    let engine = Engine::new();
    let external = Buffer::new(Shape::from([2]), TensorData::from(vec![1i32, 2])).unwrap();
    assert_eq!(engine.count(), 0);

    engine
        .scope("adopt", |engine| {
            engine.track(&external)?;
            Ok(())
        })
        .unwrap();

    assert!(external.is_disposed());
}

#[test]
fn memory_reports_bytes_per_dtype() {
    let engine = Engine::new();
    engine.zeros([2, 3], DType::F32).unwrap();
    engine.from_bool([4], vec![true; 4]).unwrap();
    engine.from_i32([1], vec![5]).unwrap();

    let memory = engine.memory();
    assert_eq!(memory.num_buffers, 3);
    assert_eq!(memory.num_bytes, 6 * 4 + 4 + 4);
    assert_eq!(memory.num_variables, 0);
}

#[test]
fn zero_sized_dimension_is_an_error() {
    let engine = Engine::new();
    assert_eq!(
        engine.zeros([2, 0], DType::F32).unwrap_err(),
        ArenaError::InvalidShape { dims: vec![2, 0] }
    );
    assert_eq!(
        engine.from_f32(vec![0], Vec::new()).unwrap_err(),
        ArenaError::InvalidShape { dims: vec![0] }
    );
    assert_eq!(engine.count(), 0);
}
