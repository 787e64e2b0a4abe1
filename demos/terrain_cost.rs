use env_logger::{Builder, Env};
use ndarray::{array, Array, Array1, Axis};
use rover_gpr::{GprParams, OnlineGaussianProcess};

const ROVER_GPR_LOG: &str = "ROVER_GPR_LOG";

/// Synthetic traversal cost of a terrain patch at (x, y)
fn terrain_cost(x: f64, y: f64) -> f64 {
    1. + 0.5 * (x / 3.).sin() * (y / 2.).cos() + 0.05 * x
}

fn main() {
    let env = Env::new().filter_or(ROVER_GPR_LOG, "info");
    let mut builder = Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();

    let params = GprParams::new().sigma_f(1.).length_scale(2.).sigma_n(0.05);
    let mut gp = OnlineGaussianProcess::with_params(2, 1, params).expect("GP created");

    // rover drives along a diagonal and records the cost it experiences
    let path = Array::linspace(0., 10., 21);
    for (i, t) in path.iter().enumerate() {
        let y = t + 0.5 * (i as f64).sin();
        gp.add_training_data(&array![*t, y], &array![terrain_cost(*t, y)])
            .expect("sample added");
        if i % 5 == 4 {
            gp.prepare_regression(false).expect("regression prepared");
            println!("{gp}");
        }
    }

    let probes: Array1<f64> = Array::linspace(0., 10., 6);
    let queries = probes.insert_axis(Axis(1)) * array![[1., 1.]];
    let (means, variances) = gp.predict_valvar(&queries).expect("GP prediction");
    for ((q, m), v) in queries.rows().into_iter().zip(means.rows()).zip(variances.iter()) {
        println!(
            "cost at ({:.1}, {:.1}): predicted {:.3} +/- {:.3}, true {:.3}",
            q[0],
            q[1],
            m[0],
            v.sqrt(),
            terrain_cost(q[0], q[1])
        );
    }

    let far = array![50., -50.];
    let (mean, variance) = gp.predict_mean_and_variance(&far).expect("GP prediction");
    println!(
        "cost far from the path: {:.3} with variance {:.3}",
        mean[0], variance
    );
}
