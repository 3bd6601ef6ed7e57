// PyO3 bindings for dumpanon_core
use once_cell::sync::Lazy;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict, PyModule, PyString};
use std::sync::{Arc, PoisonError, RwLock};

use dumpanon_core as core;

use core::{
    AnonymizerCore, ColumnId, LengthClass, Quoting, ThresholdPolicy, Transform, TransformError, Value, SCHEMA_CACHE,
};

// Readers take an Arc snapshot and drop the lock before running transforms, so
// a Python callable that releases the GIL can never wait on a writer.
static ANONYMIZER: Lazy<RwLock<Option<Arc<AnonymizerCore>>>> = Lazy::new(|| RwLock::new(None));

fn anonymizer() -> PyResult<Arc<AnonymizerCore>> {
    ANONYMIZER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or_else(|| PyValueError::new_err("No anonymizer loaded"))
}

fn set_anonymizer(anon: AnonymizerCore) {
    *ANONYMIZER.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(anon));
}

fn value_err(e: impl ToString) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Accept `str` or `bytes`; remember which so results come back the same way.
fn input_bytes(obj: &Bound<'_, PyAny>) -> PyResult<(Vec<u8>, bool)> {
    if let Ok(s) = obj.downcast::<PyString>() {
        return Ok((s.to_str()?.as_bytes().to_vec(), true));
    }
    if let Ok(b) = obj.downcast::<PyBytes>() {
        return Ok((b.as_bytes().to_vec(), false));
    }
    Err(PyValueError::new_err("expected str or bytes"))
}

fn output<'py>(py: Python<'py>, bytes: Vec<u8>, as_str: bool) -> Bound<'py, PyAny> {
    if as_str {
        match String::from_utf8(bytes) {
            Ok(s) => return PyString::new(py, &s).into_any(),
            Err(e) => return PyBytes::new(py, e.as_bytes()).into_any(),
        }
    }
    PyBytes::new(py, &bytes).into_any()
}

fn parse_quoting(name: Option<&str>) -> PyResult<Quoting> {
    match name.map(str::to_ascii_lowercase).as_deref() {
        None | Some("asinput") => Ok(Quoting::AsInput),
        Some("quoted") => Ok(Quoting::Quoted),
        Some("unquoted") => Ok(Quoting::Unquoted),
        Some("null") => Ok(Quoting::Null),
        Some(other) => Err(PyValueError::new_err(format!("Unknown quoting: {}", other))),
    }
}

fn column_ids(table: &str, columns: &[String]) -> Vec<ColumnId> {
    columns.iter().map(|c| ColumnId::new(table, c.as_str())).collect()
}

/// A Python callable used as a column transform.
struct PyTransform {
    func: Py<PyAny>,
    pass_class: bool,
    quoting: Quoting,
}

impl Transform for PyTransform {
    fn apply(&self, value: &Value, class: LengthClass) -> Result<Value, TransformError> {
        Python::attach(|py| {
            let arg = match value.as_str() {
                Some(s) => PyString::new(py, s).into_any(),
                None => PyBytes::new(py, value.as_bytes()).into_any(),
            };
            let func = self.func.bind(py);
            let result = if self.pass_class { func.call1((arg, class.as_str())) } else { func.call1((arg,)) };
            // only the exception type is kept, its message may quote the value
            let result = result.map_err(|e| {
                let kind = e.get_type(py).name().map(|n| n.to_string()).unwrap_or_else(|_| "exception".into());
                TransformError::new(format!("python callable raised {}", kind))
            })?;
            if let Ok(s) = result.downcast::<PyString>() {
                let s = s.to_str().map_err(|_| TransformError::new("callable returned invalid str"))?;
                return Ok(Value::from(s));
            }
            if let Ok(b) = result.downcast::<PyBytes>() {
                return Ok(Value::from(b.as_bytes()));
            }
            Err(TransformError::new("callable must return str or bytes"))
        })
    }

    fn quoting(&self) -> Quoting {
        self.quoting
    }
}

/// Escape a string the way mysqldump writes it inside quotes.
#[pyfunction]
#[pyo3(text_signature = "(value)")]
fn escape_sql_string(value: &str) -> PyResult<String> {
    String::from_utf8(core::escape(value.as_bytes())).map_err(value_err)
}

/// Reverse escape_sql_string on the body of a quoted literal.
/// Raises ValueError on an unknown or truncated escape.
#[pyfunction]
#[pyo3(text_signature = "(body)")]
fn unescape_sql_string(body: &str) -> PyResult<String> {
    let raw = core::unescape(body.as_bytes()).map_err(value_err)?;
    String::from_utf8(raw).map_err(value_err)
}

/// Return "short" or "long" for a value under the given (or active) threshold.
#[pyfunction]
#[pyo3(signature = (value, threshold=None), text_signature = "(value, threshold=None)")]
fn classify(value: &Bound<'_, PyAny>, threshold: Option<usize>) -> PyResult<&'static str> {
    let (bytes, _) = input_bytes(value)?;
    let policy = match threshold {
        Some(0) => return Err(PyValueError::new_err("threshold must be at least 1")),
        Some(t) => ThresholdPolicy::new(t),
        None => anonymizer().map(|a| a.policy()).unwrap_or_default(),
    };
    Ok(policy.classify_len(bytes.len()).as_str())
}

/// Load a schema from a JSON file path. Returns True on success.
/// Raises ValueError if the file cannot be read or parsed.
#[pyfunction]
#[pyo3(text_signature = "(schema_path)")]
fn load_schema(schema_path: &str) -> PyResult<bool> {
    let loaded = core::load_schema(schema_path).map_err(value_err)?;
    *SCHEMA_CACHE.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(loaded));
    Ok(true)
}

/// Return current schema loader status and metadata.
#[pyfunction]
#[pyo3(text_signature = "()")]
fn get_schema_status(py: Python) -> PyResult<Py<PyDict>> {
    use std::time::SystemTime;
    let d = PyDict::new(py);
    match core::cached_schema() {
        Some(ls) => {
            d.set_item("loaded", true)?;
            d.set_item("path", ls.path.clone())?;
            d.set_item("tables", ls.table_count())?;
            let ms = ls
                .mtime
                .and_then(|mt| mt.duration_since(SystemTime::UNIX_EPOCH).ok())
                .map(|dur| dur.as_millis() as i64);
            d.set_item("mtime_epoch_ms", ms)?;
        }
        None => {
            d.set_item("loaded", false)?;
            d.set_item("path", py.None())?;
            d.set_item("tables", 0)?;
            d.set_item("mtime_epoch_ms", py.None())?;
        }
    }
    Ok(d.unbind())
}

/// Load anonymizer rules from a JSON file path. Returns True on success.
#[pyfunction]
#[pyo3(text_signature = "(config_path)")]
fn load_anonymizer(config_path: &str) -> PyResult<bool> {
    set_anonymizer(core::anonymizer_from_path(config_path).map_err(value_err)?);
    Ok(true)
}

/// Set anonymizer rules from a JSON string. Returns True on success.
#[pyfunction]
#[pyo3(text_signature = "(config_json)")]
fn set_anonymizer_json(config_json: &str) -> PyResult<bool> {
    set_anonymizer(core::anonymizer_from_json(config_json).map_err(value_err)?);
    Ok(true)
}

/// Register a Python callable as the transform of `table.column`.
///
/// `func(value)` receives str (bytes when the value is not UTF-8) and returns
/// str or bytes. With `pass_class=True` it is called as `func(value, "short"|"long")`.
/// Replaces any transform already registered for the column. Calls already
/// running keep the rules they started with.
#[pyfunction]
#[pyo3(
    signature = (table, column, func, quoting=None, pass_class=false),
    text_signature = "(table, column, func, quoting=None, pass_class=False)"
)]
fn register_transform(
    table: &str,
    column: &str,
    func: &Bound<'_, PyAny>,
    quoting: Option<&str>,
    pass_class: bool,
) -> PyResult<bool> {
    if !func.is_callable() {
        return Err(PyValueError::new_err("func must be callable"));
    }
    let transform = PyTransform { func: func.clone().unbind(), pass_class, quoting: parse_quoting(quoting)? };
    let mut g = ANONYMIZER.write().unwrap_or_else(PoisonError::into_inner);
    let anon = g.get_or_insert_with(|| Arc::new(AnonymizerCore::new(ThresholdPolicy::default())));
    // copies the registry when a running call still holds the current one
    Ok(Arc::make_mut(anon).register(ColumnId::new(table, column), Arc::new(transform)).is_some())
}

/// Return anonymizer status: enabled flag, threshold and configured columns.
#[pyfunction]
#[pyo3(text_signature = "()")]
fn get_anonymizer_status(py: Python) -> PyResult<Py<PyDict>> {
    let d = PyDict::new(py);
    if let Ok(a) = anonymizer() {
        let mut columns: Vec<String> = a.columns().map(|c| c.to_string()).collect();
        columns.sort();
        d.set_item("enabled", true)?;
        d.set_item("threshold", a.policy().threshold)?;
        d.set_item("columns", columns)?;
    } else {
        d.set_item("enabled", false)?;
    }
    Ok(d.unbind())
}

/// Transform one `(lit, lit, ...)` tuple of `table`, whose literals are named by `columns`.
/// Raises ValueError when a literal is malformed or a transform fails.
#[pyfunction]
#[pyo3(text_signature = "(table, columns, row)")]
fn transform_row<'py>(
    py: Python<'py>,
    table: &str,
    columns: Vec<String>,
    row: &Bound<'py, PyAny>,
) -> PyResult<Bound<'py, PyAny>> {
    let (bytes, as_str) = input_bytes(row)?;
    let anon = anonymizer()?;
    let out = anon.transform_row(&bytes, &column_ids(table, &columns)).map_err(value_err)?;
    Ok(output(py, out, as_str))
}

/// Transform an INSERT/REPLACE line. Columns come from `columns` when given,
/// otherwise from the loaded schema. Other lines pass through; a dropped
/// (truncated) table yields an empty result.
/// Raises ValueError when the INSERT has no recognizable table or VALUES list.
#[pyfunction]
#[pyo3(signature = (line, columns=None), text_signature = "(line, columns=None)")]
fn transform_statement<'py>(
    py: Python<'py>,
    line: &Bound<'py, PyAny>,
    columns: Option<Vec<String>>,
) -> PyResult<Bound<'py, PyAny>> {
    let (bytes, as_str) = input_bytes(line)?;
    let anon = anonymizer()?;
    let out = match columns {
        Some(columns) => py.detach(|| anon.transform_statement_named(&bytes, &columns)),
        None => {
            let schema = core::cached_schema()
                .ok_or_else(|| PyValueError::new_err("No schema loaded. Call load_schema() or pass columns."))?;
            py.detach(|| anon.transform_statement_with_schema(&bytes, &schema))
        }
    }
    .map_err(value_err)?;
    Ok(output(py, out, as_str))
}

/// Transform a batch of tuples of `table` in parallel.
/// Rows are processed without holding the interpreter; results keep input order.
/// Raises ValueError naming the first failing row.
#[pyfunction]
#[pyo3(text_signature = "(table, columns, rows)")]
fn transform_rows_batch<'py>(
    py: Python<'py>,
    table: &str,
    columns: Vec<String>,
    rows: Vec<Bound<'py, PyAny>>,
) -> PyResult<Vec<Bound<'py, PyAny>>> {
    let inputs: Vec<(Vec<u8>, bool)> = rows.iter().map(input_bytes).collect::<PyResult<_>>()?;
    let anon = anonymizer()?;
    let ids = column_ids(table, &columns);

    let raw: Vec<&[u8]> = inputs.iter().map(|(b, _)| b.as_slice()).collect();
    let results = py.detach(|| anon.transform_rows(&raw, &ids));

    let mut out = Vec::with_capacity(results.len());
    for (index, (res, (_, as_str))) in results.into_iter().zip(&inputs).enumerate() {
        let bytes = res.map_err(|e| PyValueError::new_err(format!("row {}: {}", index, e)))?;
        out.push(output(py, bytes, *as_str));
    }
    Ok(out)
}

#[pymodule]
#[pyo3(module = "dumpanon_rs")]
fn dumpanon_rs(_py: Python, m: &Bound<PyModule>) -> PyResult<()> {
    m.add(
        "__doc__",
        "Deterministic anonymization of MySQL dump rows.\n\n\
        Features:\n\
        - Exact mysqldump literal escaping and unescaping\n\
        - Keyed hash pseudonyms, short/long strategy by value length\n\
        - Python callables as column transforms\n\
        - Parallel batch processing in a Rust core\n\n\
        Quick start:\n\
        >>> import dumpanon_rs as da\n\
        >>> da.load_schema('schema.json')\n\
        >>> da.load_anonymizer('rules.json')\n\
        >>> da.transform_statement(\"INSERT INTO `users` VALUES (1,'alice');\")",
    )?;

    // Literal codec
    m.add_function(wrap_pyfunction!(escape_sql_string, m)?)?;
    m.add_function(wrap_pyfunction!(unescape_sql_string, m)?)?;
    m.add_function(wrap_pyfunction!(classify, m)?)?;

    // Schema
    m.add_function(wrap_pyfunction!(load_schema, m)?)?;
    m.add_function(wrap_pyfunction!(get_schema_status, m)?)?;

    // Anonymizer
    m.add_function(wrap_pyfunction!(load_anonymizer, m)?)?;
    m.add_function(wrap_pyfunction!(set_anonymizer_json, m)?)?;
    m.add_function(wrap_pyfunction!(register_transform, m)?)?;
    m.add_function(wrap_pyfunction!(get_anonymizer_status, m)?)?;
    m.add_function(wrap_pyfunction!(transform_row, m)?)?;
    m.add_function(wrap_pyfunction!(transform_statement, m)?)?;
    m.add_function(wrap_pyfunction!(transform_rows_batch, m)?)?;

    // Optional: preload state from env vars; failures leave the module usable.
    if let Ok(path) = std::env::var("DUMPANON_SCHEMA") {
        if let Ok(loaded) = core::load_schema(&path) {
            *SCHEMA_CACHE.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(loaded));
        }
    }
    if let Ok(path) = std::env::var("DUMPANON_CONFIG") {
        if let Ok(anon) = core::anonymizer_from_path(&path) {
            set_anonymizer(anon);
        }
    }

    Ok(())
}
