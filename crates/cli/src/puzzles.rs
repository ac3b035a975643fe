//! The puzzle catalog: fourteen kernels of increasing difficulty, each with
//! concrete inputs, a launch geometry, and a host reference.
//!
//! Kernel bodies address threads through the Metal-style builtin names the
//! assembler provides (`thread_position_in_grid` and friends), and rely on
//! derived `_shape` parameters for bounds guards. Grids are deliberately
//! over-provisioned in several puzzles, so the guards matter.

use ndarray::{ArrayD, Axis, Ix2, IxDyn};
use puzzleforge_harness::Problem;
use puzzleforge_kernel::{ArraySpec, Dtype, HostArray, KernelSpec, LaunchGeometry};

pub struct Puzzle {
    pub number: u32,
    pub name: &'static str,
    pub build: fn() -> Vec<Problem>,
}

pub fn catalog() -> Vec<Puzzle> {
    vec![
        Puzzle { number: 1, name: "map", build: map },
        Puzzle { number: 2, name: "zip", build: zip },
        Puzzle { number: 3, name: "guard", build: guard },
        Puzzle { number: 4, name: "map_2d", build: map_2d },
        Puzzle { number: 5, name: "broadcast", build: broadcast },
        Puzzle { number: 6, name: "threadgroups", build: threadgroups },
        Puzzle { number: 7, name: "threadgroups_2d", build: threadgroups_2d },
        Puzzle { number: 8, name: "threadgroup_memory", build: threadgroup_memory },
        Puzzle { number: 9, name: "pooling", build: pooling },
        Puzzle { number: 10, name: "dot_product", build: dot_product },
        Puzzle { number: 11, name: "conv_1d", build: conv_1d },
        Puzzle { number: 12, name: "prefix_sum", build: prefix_sum },
        Puzzle { number: 13, name: "axis_sum", build: axis_sum },
        Puzzle { number: 14, name: "matmul", build: matmul },
    ]
}

fn add_ten_i32(inputs: &[HostArray]) -> HostArray {
    HostArray::from(inputs[0].as_i32().unwrap().mapv(|v| v + 10))
}

fn add_ten_f32(inputs: &[HostArray]) -> HostArray {
    HostArray::from(inputs[0].as_f32().unwrap().mapv(|v| v + 10.0))
}

fn arange_i32_2d(rows: usize, cols: usize) -> HostArray {
    HostArray::arange_i32(rows * cols)
        .into_shape(&[rows, cols])
        .unwrap()
}

fn ones_f32(shape: &[usize]) -> HostArray {
    HostArray::from(ArrayD::<f32>::ones(IxDyn(shape)))
}

fn map() -> Vec<Problem> {
    let spec = KernelSpec::new(
        "map",
        r"
        let local_i = thread_position_in_grid.x;
        out[local_i] = a[local_i] + 10;
        ",
    )
    .with_inputs(["a"])
    .with_outputs(["out"]);
    vec![Problem::new(
        "map",
        spec,
        vec![HostArray::arange_i32(4)],
        ArraySpec::new(Dtype::I32, [4]),
        LaunchGeometry::new((4, 1, 1)),
        Box::new(add_ten_i32),
    )]
}

fn zip() -> Vec<Problem> {
    let spec = KernelSpec::new(
        "zip",
        r"
        let local_i = thread_position_in_grid.x;
        out[local_i] = a[local_i] + b[local_i];
        ",
    )
    .with_inputs(["a", "b"])
    .with_outputs(["out"]);
    vec![Problem::new(
        "zip",
        spec,
        vec![HostArray::arange_i32(4), HostArray::arange_i32(4)],
        ArraySpec::new(Dtype::I32, [4]),
        LaunchGeometry::new((4, 1, 1)),
        Box::new(|inputs| {
            HostArray::from(inputs[0].as_i32().unwrap() + inputs[1].as_i32().unwrap())
        }),
    )]
}

fn guard() -> Vec<Problem> {
    let spec = KernelSpec::new(
        "guard",
        r"
        let local_i = thread_position_in_grid.x;
        if (local_i < a_shape[0]) {
            out[local_i] = a[local_i] + 10;
        }
        ",
    )
    .with_inputs(["a"])
    .with_outputs(["out"]);
    // twice as many threads as elements
    vec![Problem::new(
        "guard",
        spec,
        vec![HostArray::arange_i32(4)],
        ArraySpec::new(Dtype::I32, [4]),
        LaunchGeometry::new((8, 1, 1)),
        Box::new(add_ten_i32),
    )]
}

fn map_2d() -> Vec<Problem> {
    let spec = KernelSpec::new(
        "map_2d",
        r"
        let row = thread_position_in_grid.y;
        let col = thread_position_in_grid.x;
        if (row < a_shape[0] && col < a_shape[1]) {
            out[row * a_shape[1] + col] = a[row * a_shape[1] + col] + 10;
        }
        ",
    )
    .with_inputs(["a"])
    .with_outputs(["out"]);
    vec![Problem::new(
        "map_2d",
        spec,
        vec![arange_i32_2d(2, 2)],
        ArraySpec::new(Dtype::I32, [2, 2]),
        LaunchGeometry::new((3, 3, 1)),
        Box::new(add_ten_i32),
    )]
}

fn broadcast() -> Vec<Problem> {
    let spec = KernelSpec::new(
        "broadcast",
        r"
        let row = thread_position_in_grid.y;
        let col = thread_position_in_grid.x;
        if (row < a_shape[0] && col < b_shape[1]) {
            out[row * b_shape[1] + col] = a[row] + b[col];
        }
        ",
    )
    .with_inputs(["a", "b"])
    .with_outputs(["out"]);
    vec![Problem::new(
        "broadcast",
        spec,
        vec![arange_i32_2d(2, 1), arange_i32_2d(1, 2)],
        ArraySpec::new(Dtype::I32, [2, 2]),
        LaunchGeometry::new((3, 3, 1)),
        Box::new(|inputs| {
            let a = inputs[0].as_i32().unwrap();
            let b = inputs[1].as_i32().unwrap();
            HostArray::from(ArrayD::from_shape_fn(IxDyn(&[2, 2]), |idx| {
                a[[idx[0], 0]] + b[[0, idx[1]]]
            }))
        }),
    )]
}

fn threadgroups() -> Vec<Problem> {
    let spec = KernelSpec::new(
        "threadgroups",
        r"
        let i = threadgroup_position_in_grid.x * threads_per_threadgroup.x
            + thread_position_in_threadgroup.x;
        if (i < a_shape[0]) {
            out[i] = a[i] + 10;
        }
        ",
    )
    .with_inputs(["a"])
    .with_outputs(["out"]);
    // 12 threads in groups of 4 over 9 elements
    vec![Problem::new(
        "threadgroups",
        spec,
        vec![HostArray::arange_i32(9)],
        ArraySpec::new(Dtype::I32, [9]),
        LaunchGeometry::new((12, 1, 1)).with_threadgroup((4, 1, 1)),
        Box::new(add_ten_i32),
    )]
}

fn threadgroups_2d() -> Vec<Problem> {
    let spec = KernelSpec::new(
        "threadgroups_2d",
        r"
        let row = threadgroup_position_in_grid.y * threads_per_threadgroup.y
            + thread_position_in_threadgroup.y;
        let col = threadgroup_position_in_grid.x * threads_per_threadgroup.x
            + thread_position_in_threadgroup.x;
        if (row < a_shape[0] && col < a_shape[1]) {
            out[row * a_shape[1] + col] = a[row * a_shape[1] + col] + 10.0;
        }
        ",
    )
    .with_inputs(["a"])
    .with_outputs(["out"]);
    vec![Problem::new(
        "threadgroups_2d",
        spec,
        vec![ones_f32(&[5, 5])],
        ArraySpec::new(Dtype::F32, [5, 5]),
        LaunchGeometry::new((6, 6, 1)).with_threadgroup((3, 3, 1)),
        Box::new(add_ten_f32),
    )]
}

fn threadgroup_memory() -> Vec<Problem> {
    let spec = KernelSpec::new(
        "threadgroup_memory",
        r"
        let i = thread_position_in_grid.x;
        let local_i = thread_position_in_threadgroup.x;
        if (i < a_shape[0]) {
            shared_mem[local_i] = a[i];
        }
        workgroupBarrier();
        if (i < a_shape[0]) {
            out[i] = shared_mem[local_i] + 10.0;
        }
        ",
    )
    .with_inputs(["a"])
    .with_outputs(["out"])
    .with_header(
        r"
        const THREADGROUP_MEM_SIZE: u32 = 4u;
        var<workgroup> shared_mem: array<f32, THREADGROUP_MEM_SIZE>;
        ",
    );
    vec![Problem::new(
        "threadgroup_memory",
        spec,
        vec![ones_f32(&[8])],
        ArraySpec::new(Dtype::F32, [8]),
        LaunchGeometry::new((8, 1, 1)).with_threadgroup((4, 1, 1)),
        Box::new(add_ten_f32),
    )]
}

fn pooling() -> Vec<Problem> {
    let spec = KernelSpec::new(
        "pooling",
        r"
        let i = thread_position_in_grid.x;
        let local_i = thread_position_in_threadgroup.x;
        if (i < a_shape[0]) {
            cache[local_i] = a[i];
        }
        workgroupBarrier();
        if (i < a_shape[0]) {
            var result = cache[local_i];
            if (local_i >= 1u) {
                result = result + cache[local_i - 1u];
            }
            if (local_i >= 2u) {
                result = result + cache[local_i - 2u];
            }
            out[i] = result;
        }
        ",
    )
    .with_inputs(["a"])
    .with_outputs(["out"])
    .with_header(
        r"
        const THREADGROUP_MEM_SIZE: u32 = 8u;
        var<workgroup> cache: array<f32, THREADGROUP_MEM_SIZE>;
        ",
    );
    vec![Problem::new(
        "pooling",
        spec,
        vec![HostArray::arange_f32(8)],
        ArraySpec::new(Dtype::F32, [8]),
        LaunchGeometry::new((8, 1, 1)).with_threadgroup((8, 1, 1)),
        Box::new(|inputs| {
            let a = inputs[0].as_f32().unwrap();
            let pooled: Vec<f32> = (0..a.len())
                .map(|i| (i.saturating_sub(2)..=i).map(|j| a[[j]]).sum())
                .collect();
            HostArray::from_vec_f32(&[a.len()], pooled).unwrap()
        }),
    )]
}

fn dot_product() -> Vec<Problem> {
    let spec = KernelSpec::new(
        "dot_product",
        r"
        let i = thread_position_in_grid.x;
        let local_i = thread_position_in_threadgroup.x;
        if (i < a_shape[0]) {
            cache[local_i] = a[i] * b[i];
        } else {
            cache[local_i] = 0.0;
        }
        workgroupBarrier();
        var offset = threads_per_threadgroup.x / 2u;
        while (offset > 0u) {
            if (local_i < offset) {
                cache[local_i] = cache[local_i] + cache[local_i + offset];
            }
            workgroupBarrier();
            offset = offset / 2u;
        }
        if (local_i == 0u) {
            out[threadgroup_position_in_grid.x] = cache[0u];
        }
        ",
    )
    .with_inputs(["a", "b"])
    .with_outputs(["out"])
    .with_header(
        r"
        const THREADGROUP_MEM_SIZE: u32 = 8u;
        var<workgroup> cache: array<f32, THREADGROUP_MEM_SIZE>;
        ",
    );
    vec![Problem::new(
        "dot_product",
        spec,
        vec![HostArray::arange_f32(8), HostArray::arange_f32(8)],
        ArraySpec::new(Dtype::F32, [1]),
        LaunchGeometry::new((8, 1, 1)).with_threadgroup((8, 1, 1)),
        Box::new(|inputs| {
            let a = inputs[0].as_f32().unwrap();
            let b = inputs[1].as_f32().unwrap();
            HostArray::from_vec_f32(&[1], vec![(a * b).sum()]).unwrap()
        }),
    )]
}

fn conv_1d() -> Vec<Problem> {
    let spec = || {
        KernelSpec::new(
            "conv_1d",
            r"
            let i = thread_position_in_grid.x;
            let local_i = thread_position_in_threadgroup.x;
            let tpb = threads_per_threadgroup.x;
            if (i < a_shape[0]) {
                shared_a[local_i] = a[i];
            }
            if (local_i < b_shape[0]) {
                shared_b[local_i] = b[local_i];
            } else {
                let local_i2 = local_i - b_shape[0];
                let i2 = i - b_shape[0];
                if (i2 + tpb < a_shape[0] && local_i2 < b_shape[0] - 1u) {
                    shared_a[tpb + local_i2] = a[i2 + tpb];
                }
            }
            workgroupBarrier();
            if (i < a_shape[0]) {
                var acc = 0.0;
                for (var k = 0u; k < b_shape[0]; k++) {
                    if (i + k < a_shape[0]) {
                        acc = acc + shared_a[local_i + k] * shared_b[k];
                    }
                }
                out[i] = acc;
            }
            ",
        )
        .with_inputs(["a", "b"])
        .with_outputs(["out"])
        .with_header(
            r"
            const THREADGROUP_SHARED_A: u32 = 12u;
            const THREADGROUP_SHARED_B: u32 = 4u;
            var<workgroup> shared_a: array<f32, THREADGROUP_SHARED_A>;
            var<workgroup> shared_b: array<f32, THREADGROUP_SHARED_B>;
            ",
        )
    };
    let reference: fn(&[HostArray]) -> HostArray = |inputs| {
        let a = inputs[0].as_f32().unwrap();
        let b = inputs[1].as_f32().unwrap();
        let convolved: Vec<f32> = (0..a.len())
            .map(|i| {
                (0..b.len())
                    .filter(|&j| i + j < a.len())
                    .map(|j| a[[i + j]] * b[[j]])
                    .sum()
            })
            .collect();
        HostArray::from_vec_f32(&[a.len()], convolved).unwrap()
    };
    vec![
        Problem::new(
            "conv_1d_simple",
            spec(),
            vec![HostArray::arange_f32(6), HostArray::arange_f32(3)],
            ArraySpec::new(Dtype::F32, [6]),
            LaunchGeometry::new((8, 1, 1)).with_threadgroup((8, 1, 1)),
            Box::new(reference),
        ),
        Problem::new(
            "conv_1d_full",
            spec(),
            vec![HostArray::arange_f32(15), HostArray::arange_f32(4)],
            ArraySpec::new(Dtype::F32, [15]),
            LaunchGeometry::new((16, 1, 1)).with_threadgroup((8, 1, 1)),
            Box::new(reference),
        ),
    ]
}

fn prefix_sum() -> Vec<Problem> {
    let spec = || {
        KernelSpec::new(
            "prefix_sum",
            r"
            let i = thread_position_in_grid.x;
            let local_i = thread_position_in_threadgroup.x;
            if (i < a_shape[0]) {
                cache[local_i] = a[i];
            } else {
                cache[local_i] = 0.0;
            }
            workgroupBarrier();
            for (var k = 0u; k < 3u; k++) {
                let p = 1u << k;
                if (local_i % (2u * p) == 0u && local_i + p < threads_per_threadgroup.x) {
                    cache[local_i] = cache[local_i] + cache[local_i + p];
                }
                workgroupBarrier();
            }
            if (local_i == 0u) {
                out[threadgroup_position_in_grid.x] = cache[0u];
            }
            ",
        )
        .with_inputs(["a"])
        .with_outputs(["out"])
        .with_header(
            r"
            const THREADGROUP_MEM_SIZE: u32 = 8u;
            var<workgroup> cache: array<f32, THREADGROUP_MEM_SIZE>;
            ",
        )
    };
    let reference: fn(&[HostArray]) -> HostArray = |inputs| {
        let a = inputs[0].as_f32().unwrap();
        let sums: Vec<f32> = a
            .as_slice()
            .unwrap()
            .chunks(8)
            .map(|chunk| chunk.iter().sum())
            .collect();
        let blocks = sums.len();
        HostArray::from_vec_f32(&[blocks], sums).unwrap()
    };
    vec![
        Problem::new(
            "prefix_sum_simple",
            spec(),
            vec![HostArray::arange_f32(8)],
            ArraySpec::new(Dtype::F32, [1]),
            LaunchGeometry::new((8, 1, 1)).with_threadgroup((8, 1, 1)),
            Box::new(reference),
        ),
        Problem::new(
            "prefix_sum_full",
            spec(),
            vec![HostArray::arange_f32(15)],
            ArraySpec::new(Dtype::F32, [2]),
            LaunchGeometry::new((16, 1, 1)).with_threadgroup((8, 1, 1)),
            Box::new(reference),
        ),
    ]
}

fn axis_sum() -> Vec<Problem> {
    let spec = KernelSpec::new(
        "axis_sum",
        r"
        let batch = threadgroup_position_in_grid.y;
        let i = thread_position_in_grid.x;
        let local_i = thread_position_in_threadgroup.x;
        if (i < a_shape[1]) {
            cache[local_i] = a[batch * a_shape[1] + i];
        } else {
            cache[local_i] = 0.0;
        }
        workgroupBarrier();
        for (var k = 0u; k < 3u; k++) {
            let p = 1u << k;
            if (local_i % (2u * p) == 0u && local_i + p < threads_per_threadgroup.x) {
                cache[local_i] = cache[local_i] + cache[local_i + p];
            }
            workgroupBarrier();
        }
        if (local_i == 0u) {
            out[batch] = cache[0u];
        }
        ",
    )
    .with_inputs(["a"])
    .with_outputs(["out"])
    .with_header(
        r"
        const THREADGROUP_MEM_SIZE: u32 = 8u;
        var<workgroup> cache: array<f32, THREADGROUP_MEM_SIZE>;
        ",
    );
    vec![Problem::new(
        "axis_sum",
        spec,
        vec![HostArray::arange_f32(24).into_shape(&[4, 6]).unwrap()],
        ArraySpec::new(Dtype::F32, [4, 1]),
        LaunchGeometry::new((8, 4, 1)).with_threadgroup((8, 1, 1)),
        Box::new(|inputs| {
            let a = inputs[0].as_f32().unwrap();
            HostArray::from(a.sum_axis(Axis(1)).insert_axis(Axis(1)))
        }),
    )]
}

fn matmul() -> Vec<Problem> {
    let spec = || {
        KernelSpec::new(
            "matmul",
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
        .with_header(
            r"
            const TILE: u32 = 3u;
            var<workgroup> a_shared: array<array<f32, TILE>, TILE>;
            var<workgroup> b_shared: array<array<f32, TILE>, TILE>;
            ",
        )
    };
    let reference: fn(&[HostArray]) -> HostArray = |inputs| {
        let a = inputs[0]
            .as_f32()
            .unwrap()
            .clone()
            .into_dimensionality::<Ix2>()
            .unwrap();
        let b = inputs[1]
            .as_f32()
            .unwrap()
            .clone()
            .into_dimensionality::<Ix2>()
            .unwrap();
        HostArray::from(a.dot(&b).into_dyn())
    };
    let square = |n: usize| {
        let a = HostArray::arange_f32(n * n).into_shape(&[n, n]).unwrap();
        let b = HostArray::from(a.as_f32().unwrap().t().to_owned());
        (a, b)
    };
    let (a_small, b_small) = square(2);
    let (a_large, b_large) = square(8);
    vec![
        Problem::new(
            "matmul_small",
            spec(),
            vec![a_small, b_small],
            ArraySpec::new(Dtype::F32, [2, 2]),
            LaunchGeometry::new((3, 3, 1)).with_threadgroup((3, 3, 1)),
            Box::new(reference),
        ),
        Problem::new(
            "matmul_large",
            spec(),
            vec![a_large, b_large],
            ArraySpec::new(Dtype::F32, [8, 8]),
            LaunchGeometry::new((9, 9, 1)).with_threadgroup((3, 3, 1)),
            Box::new(reference),
        ),
    ]
}
