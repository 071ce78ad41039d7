//! Native modules importable from in-process scripts.

use rand::seq::SliceRandom;
use rand::Rng;
use rhai::{Array, Dynamic, EvalAltResult, Module, FLOAT, INT};

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

pub const ALLOWED_MODULES: &[&str] = &["math", "random", "statistics"];

pub fn allowed_module(name: &str) -> Option<Module> {
    match name {
        "math" => Some(math_module()),
        "random" => Some(random_module()),
        "statistics" => Some(statistics_module()),
        _ => None,
    }
}

fn math_module() -> Module {
    let mut module = Module::new();
    module.set_var("PI", std::f64::consts::PI);
    module.set_var("E", std::f64::consts::E);
    module.set_var("TAU", std::f64::consts::TAU);

    module.set_native_fn("sqrt", |x: FLOAT| Ok(x.sqrt()));
    module.set_native_fn("pow", |x: FLOAT, y: FLOAT| Ok(x.powf(y)));
    module.set_native_fn("exp", |x: FLOAT| Ok(x.exp()));
    module.set_native_fn("log", |x: FLOAT| Ok(x.ln()));
    module.set_native_fn("log10", |x: FLOAT| Ok(x.log10()));
    module.set_native_fn("sin", |x: FLOAT| Ok(x.sin()));
    module.set_native_fn("cos", |x: FLOAT| Ok(x.cos()));
    module.set_native_fn("tan", |x: FLOAT| Ok(x.tan()));
    module.set_native_fn("floor", |x: FLOAT| Ok(x.floor()));
    module.set_native_fn("ceil", |x: FLOAT| Ok(x.ceil()));
    module.set_native_fn("fabs", |x: FLOAT| Ok(x.abs()));
    module.set_native_fn("hypot", |x: FLOAT, y: FLOAT| Ok(x.hypot(y)));
    module.set_native_fn("gcd", |a: INT, b: INT| Ok(gcd(a, b)));
    module.set_native_fn("factorial", factorial);
    module
}

fn gcd(a: INT, b: INT) -> INT {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn factorial(n: INT) -> ScriptResult<INT> {
    if n < 0 {
        return Err("factorial() not defined for negative values".into());
    }
    (1..=n)
        .try_fold(1 as INT, |acc, k| acc.checked_mul(k))
        .ok_or_else(|| "factorial() overflow".into())
}

fn random_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("random", || Ok(rand::thread_rng().gen::<FLOAT>()));
    module.set_native_fn("randint", |low: INT, high: INT| -> ScriptResult<INT> {
        if low > high {
            return Err(format!("empty range for randint({low}, {high})").into());
        }
        Ok(rand::thread_rng().gen_range(low..=high))
    });
    module.set_native_fn("uniform", |low: FLOAT, high: FLOAT| {
        Ok(low + (high - low) * rand::thread_rng().gen::<FLOAT>())
    });
    module.set_native_fn("choice", |items: Array| -> ScriptResult<Dynamic> {
        items
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| "cannot choose from an empty array".into())
    });
    module.set_native_fn("shuffle", |mut items: Array| -> ScriptResult<Array> {
        items.shuffle(&mut rand::thread_rng());
        Ok(items)
    });
    module
}

fn numbers(items: &Array, function: &str) -> ScriptResult<Vec<FLOAT>> {
    if items.is_empty() {
        return Err(format!("{function}() requires at least one data point").into());
    }
    items
        .iter()
        .map(|item| {
            item.as_float()
                .or_else(|_| item.as_int().map(|i| i as FLOAT))
                .map_err(|type_name| {
                    Box::<EvalAltResult>::from(format!(
                        "{function}() expects numbers, got {type_name}"
                    ))
                })
        })
        .collect()
}

fn mean_of(values: &[FLOAT]) -> FLOAT {
    values.iter().sum::<FLOAT>() / values.len() as FLOAT
}

fn variance_of(values: &[FLOAT], function: &str) -> ScriptResult<FLOAT> {
    if values.len() < 2 {
        return Err(format!("{function}() requires at least two data points").into());
    }
    let mean = mean_of(values);
    Ok(values.iter().map(|v| (v - mean).powi(2)).sum::<FLOAT>() / (values.len() - 1) as FLOAT)
}

fn statistics_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("mean", |items: Array| -> ScriptResult<FLOAT> {
        Ok(mean_of(&numbers(&items, "mean")?))
    });
    module.set_native_fn("median", |items: Array| -> ScriptResult<FLOAT> {
        let mut values = numbers(&items, "median")?;
        values.sort_by(|a, b| a.total_cmp(b));
        let mid = values.len() / 2;
        Ok(if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        })
    });
    module.set_native_fn("variance", |items: Array| -> ScriptResult<FLOAT> {
        variance_of(&numbers(&items, "variance")?, "variance")
    });
    module.set_native_fn("stdev", |items: Array| -> ScriptResult<FLOAT> {
        Ok(variance_of(&numbers(&items, "stdev")?, "stdev")?.sqrt())
    });
    module.set_native_fn("fsum", |items: Array| -> ScriptResult<FLOAT> {
        Ok(numbers(&items, "fsum")?.iter().sum::<FLOAT>())
    });
    module
}
