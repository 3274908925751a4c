use std::{
    io::{Cursor, Write},
    sync::Arc,
};

use machine_learning::{
    arch::{ModelBuilder, ModelKind, ModelSpec, TrainableModel, loss::get_loss_function},
    data::{BatchStream, Features, SeriesFrame, Split, StandardScaler, WindowDataset, WindowSpec, WindowStream},
    optimization::{Adam, Optimizer},
};

fn sine_csv(rows: usize) -> String {
    let mut csv = String::from("date,a,OT\n");
    for i in 0..rows {
        let t = i as f32 / 4.0;
        csv.push_str(&format!("d{i},{},{}\n", t.cos(), t.sin()));
    }
    csv
}

fn epoch_loss(
    model: &mut dyn TrainableModel,
    optimizer: &mut Adam,
    stream: &WindowStream,
) -> f32 {
    let loss_fn = get_loss_function("mse").unwrap();
    let mut total = 0.0;

    for batch in stream.batches() {
        model.zero_grad();
        let pred = model
            .forward(batch.x.view(), batch.x_mark.view(), batch.y.view(), batch.y_mark.view())
            .unwrap()
            .into_output();
        let target = batch.y.slice(ndarray::s![.., -4.., ..]);

        total += loss_fn.loss(pred.view(), target);
        model.backward(loss_fn.loss_prime(pred.view(), target).view()).unwrap();
        optimizer.step(model.parameters_mut()).unwrap();
    }

    total / stream.len() as f32
}

#[test]
fn models_learn_a_periodic_series() {
    let frame = SeriesFrame::from_reader(Cursor::new(sine_csv(200)), Features::M, "OT").unwrap();
    let spec = WindowSpec {
        seq_len: 16,
        label_len: 8,
        pred_len: 4,
    };
    let train_rows = frame.slice_rows(machine_learning::data::SplitBorders::new(200, 16).train);
    let scaler = Arc::new(StandardScaler::fit(train_rows).unwrap());
    let train = Arc::new(WindowDataset::from_frame(&frame, Split::Train, spec, Some(&scaler)).unwrap());
    let stream = WindowStream::new(train, 16).unwrap().with_scaler(scaler);

    for kind in [ModelKind::Linear, ModelKind::DLinear] {
        let model_spec = ModelSpec {
            seq_len: 16,
            pred_len: 4,
            enc_in: 2,
            moving_avg: 5,
            output_attention: false,
            seed: 3,
        };
        let mut model = ModelBuilder::build(kind, &model_spec).unwrap();
        let mut optimizer = Adam::with_defaults(model.parameters(), 1e-2);

        let first = epoch_loss(model.as_mut(), &mut optimizer, &stream);
        let mut last = first;
        for _ in 0..40 {
            last = epoch_loss(model.as_mut(), &mut optimizer, &stream);
        }

        assert!(last < first * 0.5, "{kind}: {first} -> {last}");
    }

    assert!(stream.scaler().is_some());
}

#[test]
fn frames_load_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(sine_csv(10).as_bytes()).unwrap();

    let frame = SeriesFrame::from_csv(file.path(), Features::MS, "OT").unwrap();

    assert_eq!(frame.rows(), 10);
    assert_eq!(frame.columns().last().map(String::as_str), Some("OT"));
}
