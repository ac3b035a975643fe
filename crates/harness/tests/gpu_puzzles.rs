//! End-to-end checks against a real adapter. Every test skips cleanly on
//! machines without a GPU.

use puzzleforge_backend_gpu::{ComputeRuntime, RuntimeError, WgpuRuntime};
use puzzleforge_harness::Problem;
use puzzleforge_kernel::{assemble, ArraySpec, Dtype, HostArray, KernelSpec, LaunchGeometry};

fn runtime() -> Option<WgpuRuntime> {
    match WgpuRuntime::new() {
        Ok(runtime) => Some(runtime),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

fn add_ten_spec() -> KernelSpec {
    KernelSpec::new(
        "add_ten",
        "let local_i = thread_position_in_grid.x;\n\
         out[local_i] = a[local_i] + 10;",
    )
    .with_inputs(["a"])
    .with_outputs(["out"])
}

#[test]
fn add_ten_roundtrip() {
    let Some(mut runtime) = runtime() else { return };
    let problem = Problem::new(
        "add_ten",
        add_ten_spec(),
        vec![HostArray::arange_i32(4)],
        ArraySpec::new(Dtype::I32, [4]),
        LaunchGeometry::new((4, 1, 1)).with_threadgroup((4, 1, 1)),
        Box::new(|inputs| {
            HostArray::from(inputs[0].as_i32().unwrap().mapv(|v| v + 10))
        }),
    );
    let report = problem.check(&mut runtime).unwrap();
    assert_eq!(report.elements, 4);
    assert_eq!(report.max_abs_error, 0.0);
}

#[test]
fn guarded_kernel_survives_overprovisioned_grid() {
    let Some(mut runtime) = runtime() else { return };
    let spec = KernelSpec::new(
        "add_ten_guard",
        "let local_i = thread_position_in_grid.x;\n\
         if (local_i < a_shape[0]) {\n\
             out[local_i] = a[local_i] + 10;\n\
         }",
    )
    .with_inputs(["a"])
    .with_outputs(["out"]);
    // twice as many threads as elements
    let problem = Problem::new(
        "add_ten_guard",
        spec,
        vec![HostArray::arange_i32(4)],
        ArraySpec::new(Dtype::I32, [4]),
        LaunchGeometry::new((8, 1, 1)).with_threadgroup((8, 1, 1)),
        Box::new(|inputs| {
            HostArray::from(inputs[0].as_i32().unwrap().mapv(|v| v + 10))
        }),
    );
    assert!(problem.check(&mut runtime).is_ok());
}

#[test]
fn dot_product_with_threadgroup_reduction() {
    let Some(mut runtime) = runtime() else { return };
    let spec = KernelSpec::new(
        "dot",
        "let i = thread_position_in_grid.x;\n\
         let local_i = thread_position_in_threadgroup.x;\n\
         if (i < a_shape[0]) {\n\
             cache[local_i] = a[i] * b[i];\n\
         } else {\n\
             cache[local_i] = 0.0;\n\
         }\n\
         workgroupBarrier();\n\
         var offset = threads_per_threadgroup.x / 2u;\n\
         while (offset > 0u) {\n\
             if (local_i < offset) {\n\
                 cache[local_i] = cache[local_i] + cache[local_i + offset];\n\
             }\n\
             workgroupBarrier();\n\
             offset = offset / 2u;\n\
         }\n\
         if (local_i == 0u) {\n\
             out[threadgroup_position_in_grid.x] = cache[0u];\n\
         }",
    )
    .with_inputs(["a", "b"])
    .with_outputs(["out"])
    .with_header(
        "const THREADGROUP_MEM_SIZE: u32 = 8u;\n\
         var<workgroup> cache: array<f32, THREADGROUP_MEM_SIZE>;",
    );
    let problem = Problem::new(
        "dot",
        spec,
        vec![HostArray::arange_f32(8), HostArray::arange_f32(8)],
        ArraySpec::new(Dtype::F32, [1]),
        LaunchGeometry::new((8, 1, 1)).with_threadgroup((8, 1, 1)),
        Box::new(|inputs| {
            let a = inputs[0].as_f32().unwrap();
            let b = inputs[1].as_f32().unwrap();
            HostArray::from_vec_f32(&[1], vec![(a * b).sum()]).unwrap()
        }),
    );
    let report = problem.check(&mut runtime).unwrap();
    // sum of squares 0..8 = 140
    approx::assert_abs_diff_eq!(report.max_abs_error, 0.0, epsilon = 1e-3);
}

fn matmul_problem(tile: u32) -> Problem {
    let spec = KernelSpec::new(
        "matmul_tiled",
        r"
        let col = thread_position_in_grid.x;
        let row = thread_position_in_grid.y;
        let local_col = thread_position_in_threadgroup.x;
        let local_row = thread_position_in_threadgroup.y;
        var acc = 0.0;
        let steps = (a_shape[1] + TILE - 1u) / TILE;
        for (var s = 0u; s < steps; s++) {
            let k0 = s * TILE;
            if (row < a_shape[0] && k0 + local_col < a_shape[1]) {
                a_shared[local_row][local_col] = a[row * a_shape[1] + k0 + local_col];
            } else {
                a_shared[local_row][local_col] = 0.0;
            }
            if (col < b_shape[1] && k0 + local_row < b_shape[0]) {
                b_shared[local_row][local_col] = b[(k0 + local_row) * b_shape[1] + col];
            } else {
                b_shared[local_row][local_col] = 0.0;
            }
            workgroupBarrier();
            for (var k = 0u; k < TILE; k++) {
                acc = acc + a_shared[local_row][k] * b_shared[k][local_col];
            }
            workgroupBarrier();
        }
        if (row < a_shape[0] && col < b_shape[1]) {
            out[row * b_shape[1] + col] = acc;
        }
        ",
    )
    .with_inputs(["a", "b"])
    .with_outputs(["out"])
    .with_header(format!(
        "const TILE: u32 = {tile}u;\n\
         var<workgroup> a_shared: array<array<f32, TILE>, TILE>;\n\
         var<workgroup> b_shared: array<array<f32, TILE>, TILE>;"
    ));

    let n = 8usize;
    let a = HostArray::arange_f32(n * n).into_shape(&[n, n]).unwrap();
    let b = {
        let t = a.as_f32().unwrap().t().to_owned();
        HostArray::from(t)
    };
    Problem::new(
        format!("matmul_tile_{tile}"),
        spec,
        vec![a, b],
        ArraySpec::new(Dtype::F32, [n, n]),
        LaunchGeometry::new((n as u32, n as u32, 1)).with_threadgroup((tile, tile, 1)),
        Box::new(move |inputs| {
            let a = inputs[0].as_f32().unwrap();
            let b = inputs[1].as_f32().unwrap();
            let n = a.shape()[0];
            let mut product = vec![0.0f32; n * n];
            for i in 0..n {
                for j in 0..n {
                    product[i * n + j] = (0..n).map(|k| a[[i, k]] * b[[k, j]]).sum();
                }
            }
            HostArray::from_vec_f32(&[n, n], product).unwrap()
        }),
    )
}

/// Tile 4 divides the 8x8 matrices evenly; tile 3 leaves ragged edges that
/// only the zero-padded loads keep correct.
#[test]
fn tiled_matmul_handles_even_and_ragged_tiles() {
    let Some(mut runtime) = runtime() else { return };
    for tile in [4u32, 3u32] {
        let problem = matmul_problem(tile);
        problem
            .check(&mut runtime)
            .unwrap_or_else(|err| panic!("tile {tile}: {err}"));
    }
}

#[test]
fn bad_wgsl_reports_a_compile_error_with_body_line() {
    let Some(mut runtime) = runtime() else { return };
    let spec = KernelSpec::new("broken", "this is not wgsl at all;")
        .with_inputs(["a"])
        .with_outputs(["out"]);
    let kernel = assemble(
        &spec,
        &[ArraySpec::new(Dtype::F32, [4])],
        &[ArraySpec::new(Dtype::F32, [4])],
        (4, 1, 1),
    )
    .unwrap();
    let err = runtime
        .execute(
            &kernel,
            &[HostArray::arange_f32(4)],
            &[ArraySpec::new(Dtype::F32, [4])],
            &LaunchGeometry::new((4, 1, 1)).with_threadgroup((4, 1, 1)),
        )
        .unwrap_err();
    match err {
        RuntimeError::Compile(compile) => {
            assert_eq!(compile.kernel, "broken");
            assert_eq!(compile.body_line, kernel.body_line);
            assert!(!compile.diagnostic.is_empty());
        }
        other => panic!("expected a compile error, got: {other}"),
    }
}

#[test]
fn pipeline_cache_reuses_identical_assemblies() {
    let Some(mut runtime) = runtime() else { return };
    let inputs = vec![HostArray::arange_i32(4)];
    let output = ArraySpec::new(Dtype::I32, [4]);
    let geometry = LaunchGeometry::new((4, 1, 1)).with_threadgroup((4, 1, 1));
    let kernel = assemble(
        &add_ten_spec(),
        &[inputs[0].spec()],
        std::slice::from_ref(&output),
        geometry.threadgroup,
    )
    .unwrap();

    runtime
        .execute(&kernel, &inputs, std::slice::from_ref(&output), &geometry)
        .unwrap();
    runtime
        .execute(&kernel, &inputs, std::slice::from_ref(&output), &geometry)
        .unwrap();
    assert_eq!(runtime.compiled_kernel_count(), 1);

    // same name, different thread-group extent: new source, new pipeline
    let other = assemble(
        &add_ten_spec(),
        &[inputs[0].spec()],
        std::slice::from_ref(&output),
        (2, 1, 1),
    )
    .unwrap();
    let other_geometry = LaunchGeometry::new((4, 1, 1)).with_threadgroup((2, 1, 1));
    runtime
        .execute(&other, &inputs, std::slice::from_ref(&output), &other_geometry)
        .unwrap();
    assert_eq!(runtime.compiled_kernel_count(), 2);
}
