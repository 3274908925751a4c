use comms::Collective;
use machine_learning::{
    arch::{
        TrainableModel,
        loss::{LossFn, Metric},
    },
    data::BatchStream,
};

use crate::{
    Result, WorkerErr, coordinator::Coordinator, precision::GradientManager,
    window::ForecastWindow,
};

/// Loss and metric of a model over one stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub metric: f32,
}

/// Everything `evaluate` reads besides the model and the stream.
pub struct EvalContext<'a, C> {
    pub loss_fn: &'a dyn LossFn,
    pub metric_fn: &'a dyn Metric,
    pub window: ForecastWindow,
    pub precision: &'a GradientManager,
    pub coordinator: &'a Coordinator<C>,
}

/// Runs `model` in evaluation mode over `stream`.
///
/// Per-batch losses and metrics are summed together with the batch count
/// across replicas before averaging, so every replica gets the same result.
/// The model is put back in training mode afterwards.
///
/// # Args
/// * `model` - The model to evaluate, no gradients are accumulated.
/// * `stream` - The batches to score.
/// * `which` - The stream's name, used in errors.
/// * `ctx` - The loss, metric and collectives to use.
///
/// # Errors
/// `WorkerErr::EmptyStream` on every replica if no replica had a batch.
pub fn evaluate<C: Collective>(
    model: &mut dyn TrainableModel,
    stream: &dyn BatchStream,
    which: &'static str,
    ctx: &EvalContext<'_, C>,
) -> Result<Evaluation> {
    model.set_training(false);
    let totals = accumulate(model, stream, ctx);
    model.set_training(true);

    let mut totals = totals?;
    ctx.coordinator.all_reduce_sum(&mut totals)?;

    let [loss, metric, count] = totals;
    if count == 0.0 {
        return Err(WorkerErr::EmptyStream(which));
    }

    Ok(Evaluation {
        loss: loss / count,
        metric: metric / count,
    })
}

fn accumulate<C: Collective>(
    model: &mut dyn TrainableModel,
    stream: &dyn BatchStream,
    ctx: &EvalContext<'_, C>,
) -> Result<[f32; 3]> {
    let mut totals = [0.0f32; 3];

    for batch in stream.batches() {
        let dec_inp = ctx.window.decoder_input(batch.y.view())?;
        let out = model
            .forward(
                batch.x.view(),
                batch.x_mark.view(),
                dec_inp.view(),
                batch.y_mark.view(),
            )?
            .into_output();
        let out = ctx.precision.autocast(out);

        let (pred, target) = ctx.window.scored_pair(out.view(), batch.y.view())?;

        totals[0] += ctx.loss_fn.loss(pred, target);
        totals[1] += ctx.metric_fn.measure(pred, target);
        totals[2] += 1.0;
    }

    Ok(totals)
}
