// PyO3 bindings crate
// This crate contains all Python bindings and delegates to shapeaudit-core for computation

mod ebm;

use ndarray::{Array1, Array2};
use numpy::{PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use shapeaudit_core::audit::results::{DiscontinuityTable, NonMonotonicityTable};
use shapeaudit_core::{
    AuditError, DiscontinuityOptions, FeatureFrame, NonMonotonicityOptions, ParallelSettings,
    PipelineError, ShapeAuditor, SortedShape,
};

use crate::ebm::{explanation_from_ebm_global, EbmFitter};

fn audit_error_to_py(err: AuditError) -> PyErr {
    match err {
        AuditError::ThreadPoolError(_) => PyRuntimeError::new_err(err.to_string()),
        _ => PyValueError::new_err(err.to_string()),
    }
}

/// Fitting errors are the Python exceptions raised by interpret; pass them through.
fn pipeline_error_to_py(err: PipelineError<PyErr>) -> PyErr {
    match err {
        PipelineError::Fit(py_err) => py_err,
        PipelineError::Audit(audit_err) => audit_error_to_py(audit_err),
    }
}

/// Converts a pandas DataFrame (or any 2-D array-like) into a [`FeatureFrame`].
///
/// Column names come from `data_df.columns` when present, otherwise `f0, f1, ...`.
fn frame_from_python(data_df: &Bound<'_, PyAny>) -> PyResult<FeatureFrame> {
    let py = data_df.py();
    let kwargs = PyDict::new(py);
    kwargs.set_item("dtype", "float64")?;
    let values: PyReadonlyArray2<f64> = py
        .import("numpy")?
        .call_method("asarray", (data_df,), Some(&kwargs))?
        .extract()?;
    let values = values.as_array().to_owned();

    let frame = if data_df.hasattr("columns")? {
        let columns: Vec<Bound<'_, PyAny>> =
            data_df.getattr("columns")?.call_method0("tolist")?.extract()?;
        let names = columns
            .iter()
            .map(|column| Ok(column.str()?.to_string()))
            .collect::<PyResult<Vec<String>>>()?;
        FeatureFrame::new(names, values)
    } else {
        FeatureFrame::unnamed(values)
    };
    frame.map_err(audit_error_to_py)
}

/// Converts outcomes (list, Series or array) into a float vector.
fn outcomes_from_python(y: &Bound<'_, PyAny>) -> PyResult<Array1<f64>> {
    let py = y.py();
    let kwargs = PyDict::new(py);
    kwargs.set_item("dtype", "float64")?;
    let values: PyReadonlyArray1<f64> = py
        .import("numpy")?
        .call_method("asarray", (y,), Some(&kwargs))?
        .call_method0("ravel")?
        .extract()?;
    Ok(values.as_array().to_owned())
}

fn non_monotonicity_frame<'py>(
    py: Python<'py>,
    table: &NonMonotonicityTable,
) -> PyResult<Bound<'py, PyAny>> {
    let data = PyDict::new(py);
    data.set_item(NonMonotonicityTable::COLUMNS[0], table.features())?;
    data.set_item(NonMonotonicityTable::COLUMNS[1], table.values())?;
    let kwargs = PyDict::new(py);
    kwargs.set_item("columns", NonMonotonicityTable::COLUMNS.to_vec())?;
    py.import("pandas")?
        .getattr("DataFrame")?
        .call((data,), Some(&kwargs))
}

fn discontinuity_frame<'py>(
    py: Python<'py>,
    table: &DiscontinuityTable,
) -> PyResult<Bound<'py, PyAny>> {
    let columns = DiscontinuityTable::COLUMNS;
    let data = PyDict::new(py);
    data.set_item(columns[0], table.features())?;
    data.set_item(columns[1], table.values())?;
    data.set_item(columns[2], table.n_samples())?;
    data.set_item(columns[3], table.effect_sizes())?;
    data.set_item(columns[4], table.p_ratios())?;
    let kwargs = PyDict::new(py);
    kwargs.set_item("columns", columns.to_vec())?;
    py.import("pandas")?
        .getattr("DataFrame")?
        .call((data,), Some(&kwargs))
}

fn auditor(
    non_monotonicity: NonMonotonicityOptions,
    discontinuity: DiscontinuityOptions,
    n_threads: usize,
) -> PyResult<ShapeAuditor> {
    non_monotonicity.validate().map_err(audit_error_to_py)?;
    Ok(ShapeAuditor::default()
        .with_non_monotonicity(non_monotonicity)
        .with_discontinuity(discontinuity)
        .with_parallel(ParallelSettings::with_n_threads(n_threads)))
}

/// Slopes between consecutive points of a shape function sampled at sorted x.
///
/// Zero x-differences give slope 0.
#[pyfunction]
fn calc_slopes<'py>(
    py: Python<'py>,
    x_arr: PyReadonlyArray1<f64>,
    y_arr: PyReadonlyArray1<f64>,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let slopes = shapeaudit_core::calc_slopes(&x_arr.as_array(), &y_arr.as_array())
        .map_err(audit_error_to_py)?;
    Ok(PyArray1::from_owned_array(py, slopes))
}

/// Sorted slopes of every feature's shape function in an EBM explanation.
///
/// # Returns
/// Array of shape (n_samples - 1, n_features).
#[pyfunction]
#[pyo3(signature = (ebm_global, data_df, n_threads = 1))]
fn calculate_slopes<'py>(
    py: Python<'py>,
    ebm_global: Bound<'py, PyAny>,
    data_df: Bound<'py, PyAny>,
    n_threads: usize,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    let frame = frame_from_python(&data_df)?;
    let explanation = explanation_from_ebm_global(&ebm_global, frame.names(), 0.0)?;
    let auditor = auditor(
        NonMonotonicityOptions::default(),
        DiscontinuityOptions::default(),
        n_threads,
    )?;
    let slopes = auditor
        .slopes(&explanation, &frame)
        .map_err(audit_error_to_py)?;
    Ok(PyArray2::from_owned_array(py, slopes))
}

/// Whether the sign flip at `changepoint` goes from rising to falling.
#[pyfunction]
fn is_counter_causal(my_slopes: PyReadonlyArray1<f64>, changepoint: usize) -> PyResult<bool> {
    let slopes = my_slopes.as_array().to_vec();
    Ok(shapeaudit_core::is_counter_causal(&slopes, changepoint))
}

/// Fits an EBM on the training data and returns its non-monotonicities as a
/// DataFrame with columns `Feature`, `Value`.
#[pyfunction]
#[pyo3(signature = (
    x_train,
    y_train,
    ebm_constructor_kwargs = None,
    ebm_fit_kwargs = None,
    prob_threshold = 0.2,
    counter_causal_only = false,
    n_threads = 1
))]
#[allow(clippy::too_many_arguments)]
fn find_non_monotonicities<'py>(
    py: Python<'py>,
    x_train: Bound<'py, PyAny>,
    y_train: Bound<'py, PyAny>,
    ebm_constructor_kwargs: Option<Bound<'py, PyDict>>,
    ebm_fit_kwargs: Option<Bound<'py, PyDict>>,
    prob_threshold: f64,
    counter_causal_only: bool,
    n_threads: usize,
) -> PyResult<Bound<'py, PyAny>> {
    let frame = frame_from_python(&x_train)?;
    let y = outcomes_from_python(&y_train)?;
    let auditor = auditor(
        NonMonotonicityOptions {
            prob_threshold,
            counter_causal_only,
        },
        DiscontinuityOptions::default(),
        n_threads,
    )?;
    let fitter = EbmFitter {
        x_train,
        y_train,
        constructor_kwargs: ebm_constructor_kwargs,
        fit_kwargs: ebm_fit_kwargs,
    };
    let table = auditor
        .fit_non_monotonicities(&fitter, &frame, &y.view())
        .map_err(pipeline_error_to_py)?;
    non_monotonicity_frame(py, &table)
}

/// Non-monotonicities of an existing EBM global explanation over `data_df`.
#[pyfunction]
#[pyo3(signature = (ebm_global, data_df, prob_threshold = 0.2, counter_causal_only = false, n_threads = 1))]
fn find_non_monotonicities_from_ebm<'py>(
    py: Python<'py>,
    ebm_global: Bound<'py, PyAny>,
    data_df: Bound<'py, PyAny>,
    prob_threshold: f64,
    counter_causal_only: bool,
    n_threads: usize,
) -> PyResult<Bound<'py, PyAny>> {
    let frame = frame_from_python(&data_df)?;
    let explanation = explanation_from_ebm_global(&ebm_global, frame.names(), 0.0)?;
    let auditor = auditor(
        NonMonotonicityOptions {
            prob_threshold,
            counter_causal_only,
        },
        DiscontinuityOptions::default(),
        n_threads,
    )?;
    let table = auditor
        .non_monotonicities(&explanation, &frame)
        .map_err(audit_error_to_py)?;
    non_monotonicity_frame(py, &table)
}

/// Fits an EBM on the training data and returns its discontinuities as a
/// DataFrame sorted by `P-Ratio` descending.
#[pyfunction]
#[pyo3(signature = (
    x_train,
    y_train,
    ebm_constructor_kwargs = None,
    ebm_fit_kwargs = None,
    min_samples = 100,
    n_threads = 1
))]
fn find_discontinuities<'py>(
    py: Python<'py>,
    x_train: Bound<'py, PyAny>,
    y_train: Bound<'py, PyAny>,
    ebm_constructor_kwargs: Option<Bound<'py, PyDict>>,
    ebm_fit_kwargs: Option<Bound<'py, PyDict>>,
    min_samples: usize,
    n_threads: usize,
) -> PyResult<Bound<'py, PyAny>> {
    let frame = frame_from_python(&x_train)?;
    let y = outcomes_from_python(&y_train)?;
    let auditor = auditor(
        NonMonotonicityOptions::default(),
        DiscontinuityOptions { min_samples },
        n_threads,
    )?;
    let fitter = EbmFitter {
        x_train,
        y_train,
        constructor_kwargs: ebm_constructor_kwargs,
        fit_kwargs: ebm_fit_kwargs,
    };
    let table = auditor
        .fit_discontinuities(&fitter, &frame, &y.view())
        .map_err(pipeline_error_to_py)?;
    discontinuity_frame(py, &table)
}

/// Discontinuities of an existing EBM global explanation, scored against
/// binary outcomes `y_true` in the row order of `data_df`.
#[pyfunction]
#[pyo3(signature = (ebm_global, data_df, y_true, min_samples = 100, n_threads = 1))]
fn find_discontinuities_from_ebm<'py>(
    py: Python<'py>,
    ebm_global: Bound<'py, PyAny>,
    data_df: Bound<'py, PyAny>,
    y_true: Bound<'py, PyAny>,
    min_samples: usize,
    n_threads: usize,
) -> PyResult<Bound<'py, PyAny>> {
    let frame = frame_from_python(&data_df)?;
    let y = outcomes_from_python(&y_true)?;
    let explanation = explanation_from_ebm_global(&ebm_global, frame.names(), 0.0)?;
    let auditor = auditor(
        NonMonotonicityOptions::default(),
        DiscontinuityOptions { min_samples },
        n_threads,
    )?;
    let table = auditor
        .discontinuities(&explanation, &frame, &y.view())
        .map_err(audit_error_to_py)?;
    discontinuity_frame(py, &table)
}

/// Discontinuities of one shape function sampled at sorted x.
///
/// # Returns
/// Array of shape (n_found, 4) with columns value, n_samples, effect size and
/// summed log-probability difference.
#[pyfunction]
#[pyo3(signature = (sorted_x, sorted_y, y_true, min_samples = 100))]
fn find_discontinuities_in_sorted<'py>(
    py: Python<'py>,
    sorted_x: PyReadonlyArray1<f64>,
    sorted_y: PyReadonlyArray1<f64>,
    y_true: PyReadonlyArray1<f64>,
    min_samples: usize,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    let shape = SortedShape::new(sorted_x.as_array(), sorted_y.as_array())
        .map_err(audit_error_to_py)?;
    let y_true = shape.permute(y_true.as_array()).map_err(audit_error_to_py)?;
    let found = shapeaudit_core::find_discontinuities_in_sorted(
        &shape,
        &y_true.view(),
        &DiscontinuityOptions { min_samples },
    )
    .map_err(audit_error_to_py)?;

    let mut rows = Array2::zeros((found.len(), 4));
    for (mut row, score) in rows.outer_iter_mut().zip(&found) {
        row[0] = score.value;
        row[1] = score.n_samples as f64;
        row[2] = score.effect_size;
        row[3] = score.log_p_diff;
    }
    Ok(PyArray2::from_owned_array(py, rows))
}

#[pymodule]
fn shapeaudit_rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(calc_slopes, m)?)?;
    m.add_function(wrap_pyfunction!(calculate_slopes, m)?)?;
    m.add_function(wrap_pyfunction!(is_counter_causal, m)?)?;
    m.add_function(wrap_pyfunction!(find_non_monotonicities, m)?)?;
    m.add_function(wrap_pyfunction!(find_non_monotonicities_from_ebm, m)?)?;
    m.add_function(wrap_pyfunction!(find_discontinuities, m)?)?;
    m.add_function(wrap_pyfunction!(find_discontinuities_from_ebm, m)?)?;
    m.add_function(wrap_pyfunction!(find_discontinuities_in_sorted, m)?)?;
    Ok(())
}
