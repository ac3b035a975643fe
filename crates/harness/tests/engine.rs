//! Engine behavior against a scripted runtime: no GPU required.

use puzzleforge_backend_gpu::{ComputeRuntime, RuntimeError};
use puzzleforge_harness::{CheckError, Problem, Tolerance, VerificationError};
use puzzleforge_kernel::{
    ArraySpec, AssembledKernel, Dtype, HostArray, KernelSpec, LaunchGeometry,
};

/// Runtime that records what the engine asked for and answers from a
/// host-side closure instead of a device.
struct ScriptedRuntime {
    respond: Box<dyn Fn(&[HostArray], &[ArraySpec]) -> HostArray>,
    seen_params: Vec<Vec<String>>,
    seen_geometry: Vec<LaunchGeometry>,
    calls: usize,
}

impl ScriptedRuntime {
    fn new(respond: impl Fn(&[HostArray], &[ArraySpec]) -> HostArray + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            seen_params: Vec::new(),
            seen_geometry: Vec::new(),
            calls: 0,
        }
    }
}

impl ComputeRuntime for ScriptedRuntime {
    fn execute(
        &mut self,
        kernel: &AssembledKernel,
        inputs: &[HostArray],
        outputs: &[ArraySpec],
        geometry: &LaunchGeometry,
    ) -> Result<Vec<HostArray>, RuntimeError> {
        self.calls += 1;
        self.seen_params
            .push(kernel.param_names().iter().map(|s| s.to_string()).collect());
        self.seen_geometry.push(*geometry);
        Ok(vec![(self.respond)(inputs, outputs)])
    }
}

fn zip_problem() -> Problem {
    let spec = KernelSpec::new(
        "zip",
        "let local_i = thread_position_in_grid.x;\n\
         if (local_i < a_shape[0]) {\n\
             out[local_i] = a[local_i] + b[local_i];\n\
         }",
    )
    .with_inputs(["a", "b"])
    .with_outputs(["out"]);

    Problem::new(
        "zip",
        spec,
        vec![HostArray::arange_f32(4), HostArray::arange_f32(4)],
        ArraySpec::new(Dtype::F32, [4]),
        LaunchGeometry::new((4, 1, 1)),
        Box::new(|inputs| {
            let a = inputs[0].as_f32().unwrap();
            let b = inputs[1].as_f32().unwrap();
            HostArray::from(a + b)
        }),
    )
}

#[test]
fn runtime_sees_inputs_interleaved_with_their_derived_params() {
    let mut runtime =
        ScriptedRuntime::new(|_, outputs| HostArray::zeros(outputs[0].dtype, &outputs[0].shape));
    let _ = zip_problem().check(&mut runtime);
    assert_eq!(runtime.seen_params, vec![vec!["a", "a_shape", "b", "out"]]);
    assert_eq!(runtime.seen_geometry[0].grid, (4, 1, 1));
}

#[test]
fn correct_runtime_answer_passes() {
    let mut runtime = ScriptedRuntime::new(|inputs, _| {
        let a = inputs[0].as_f32().unwrap();
        let b = inputs[1].as_f32().unwrap();
        HostArray::from(a + b)
    });
    let report = zip_problem().check(&mut runtime).unwrap();
    assert_eq!(report.elements, 4);
    assert_eq!(report.max_abs_error, 0.0);
}

#[test]
fn all_zeros_answer_fails_with_divergence_payload() {
    let mut runtime =
        ScriptedRuntime::new(|_, outputs| HostArray::zeros(outputs[0].dtype, &outputs[0].shape));
    let err = zip_problem().check(&mut runtime).unwrap_err();
    match err {
        CheckError::Verification(VerificationError::ValuesDiverge {
            mismatched,
            first_index,
            expected,
            actual,
            ..
        }) => {
            // element 0 is 0 + 0 = 0, so only the last three diverge
            assert_eq!(mismatched, 3);
            assert_eq!(first_index, 1);
            assert_eq!(expected.shape(), &[4]);
            assert_eq!(actual.as_f32().unwrap().iter().sum::<f32>(), 0.0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn tolerance_law_is_atol_plus_rtol_times_expected() {
    let problem = |tolerance: Tolerance| {
        let spec = KernelSpec::new("near", "out[0u] = a[0u];")
            .with_inputs(["a"])
            .with_outputs(["out"]);
        Problem::new(
            "near",
            spec,
            vec![HostArray::from_vec_f32(&[1], vec![100.0]).unwrap()],
            ArraySpec::new(Dtype::F32, [1]),
            LaunchGeometry::new((1, 1, 1)),
            Box::new(|inputs| inputs[0].clone()),
        )
        .with_tolerance(tolerance)
    };

    // device answer off by 0.05 against expected 100.0
    let respond = |_: &[HostArray], _: &[ArraySpec]| {
        HostArray::from_vec_f32(&[1], vec![100.05]).unwrap()
    };

    let mut runtime = ScriptedRuntime::new(respond);
    let loose = Tolerance { atol: 0.0, rtol: 1e-3 };
    assert!(problem(loose).check(&mut runtime).is_ok());

    let mut runtime = ScriptedRuntime::new(respond);
    let tight = Tolerance { atol: 1e-3, rtol: 0.0 };
    assert!(problem(tight).check(&mut runtime).is_err());
}

#[test]
fn wrong_shape_answer_is_a_shape_mismatch() {
    let mut runtime = ScriptedRuntime::new(|_, _| HostArray::zeros(Dtype::F32, &[2, 2]));
    let err = zip_problem().check(&mut runtime).unwrap_err();
    assert!(matches!(
        err,
        CheckError::Verification(VerificationError::ShapeMismatch { .. })
    ));
}

#[test]
fn show_is_read_only_and_check_still_works() {
    let problem = zip_problem();
    let listing = problem.show().unwrap();
    assert!(listing.contains("params:  a, a_shape, b, out"));
    assert!(listing.contains("@compute @workgroup_size(1, 1, 1)"));
    assert!(listing.contains("4 thread(s)"));

    // showing twice is stable, and checking afterwards is unaffected
    assert_eq!(listing, problem.show().unwrap());
    let mut runtime = ScriptedRuntime::new(|inputs, _| {
        let a = inputs[0].as_f32().unwrap();
        let b = inputs[1].as_f32().unwrap();
        HostArray::from(a + b)
    });
    assert!(problem.check(&mut runtime).is_ok());
}

#[test]
fn runtime_returning_no_outputs_is_an_error_not_a_panic() {
    struct EmptyRuntime;
    impl ComputeRuntime for EmptyRuntime {
        fn execute(
            &mut self,
            _kernel: &AssembledKernel,
            _inputs: &[HostArray],
            _outputs: &[ArraySpec],
            _geometry: &LaunchGeometry,
        ) -> Result<Vec<HostArray>, RuntimeError> {
            Ok(Vec::new())
        }
    }

    let err = zip_problem().check(&mut EmptyRuntime).unwrap_err();
    assert!(matches!(
        err,
        CheckError::Runtime(RuntimeError::Device(_))
    ));
}

#[test]
fn assembly_failure_surfaces_before_the_runtime_is_called() {
    let spec = KernelSpec::new("dangling", "out[0u] = f32(q_shape[0]);")
        .with_inputs(["a"])
        .with_outputs(["out"]);
    let problem = Problem::new(
        "dangling",
        spec,
        vec![HostArray::arange_f32(4)],
        ArraySpec::new(Dtype::F32, [1]),
        LaunchGeometry::new((1, 1, 1)),
        Box::new(|_| HostArray::zeros(Dtype::F32, &[1])),
    );
    let mut runtime =
        ScriptedRuntime::new(|_, outputs| HostArray::zeros(outputs[0].dtype, &outputs[0].shape));
    assert!(matches!(
        problem.check(&mut runtime),
        Err(CheckError::Assembly(_))
    ));
    assert_eq!(runtime.calls, 0);
}
