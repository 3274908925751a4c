use std::fmt::Display;

use comms::{Collective, ReduceOp};
use log::info;
use machine_learning::arch::TrainableModel;
use ndarray::{ArrayBase, Data, Dimension};

use crate::{Result, WorkerErr};

/// Where a tensor lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
}

/// Rank identity, barriers and I/O gating for one replica.
///
/// Every collective the training loop needs goes through here, so the order of
/// collective calls is visible in one place.
pub struct Coordinator<C> {
    collective: C,
}

impl<C: Collective> Coordinator<C> {
    pub fn new(collective: C) -> Self {
        Self { collective }
    }

    pub fn rank(&self) -> usize {
        self.collective.rank()
    }

    pub fn world_size(&self) -> usize {
        self.collective.world_size()
    }

    /// Whether this replica is the single writer of logs, checkpoints and artifacts.
    pub fn is_designated_io_process(&self) -> bool {
        self.rank() == 0
    }

    /// Blocks until every replica reaches this point.
    pub fn barrier(&self) -> Result<()> {
        Ok(self.collective.barrier()?)
    }

    pub fn device_of<S, D>(&self, _tensor: &ArrayBase<S, D>) -> Device
    where
        S: Data,
        D: Dimension,
    {
        Device::Cpu
    }

    /// Logs `msg` on the designated replica only.
    pub fn print(&self, msg: impl Display) {
        if self.is_designated_io_process() {
            info!(rank = self.rank(); "{msg}");
        }
    }

    /// Sums `buf` element-wise across replicas.
    pub fn all_reduce_sum(&self, buf: &mut [f32]) -> Result<()> {
        Ok(self.collective.all_reduce(buf, ReduceOp::Sum)?)
    }

    /// Replaces every trainable gradient with its mean across replicas.
    pub fn all_reduce_gradients(&self, model: &mut dyn TrainableModel) -> Result<()> {
        if self.world_size() == 1 {
            return Ok(());
        }

        let mut flat: Vec<f32> = Vec::new();
        for param in model.parameters().iter().filter(|p| p.requires_grad()) {
            flat.extend(param.grad().iter());
        }

        self.collective.all_reduce(&mut flat, ReduceOp::Mean)?;

        let mut offset = 0;
        for param in model.parameters_mut().iter_mut().filter(|p| p.requires_grad()) {
            let grad = param.grad_mut();
            let len = grad.len();
            grad.iter_mut()
                .zip(&flat[offset..offset + len])
                .for_each(|(g, &r)| *g = r);
            offset += len;
        }

        Ok(())
    }

    /// Overwrites every parameter with rank 0's values.
    pub fn broadcast_parameters(&self, model: &mut dyn TrainableModel) -> Result<()> {
        if self.world_size() == 1 {
            return Ok(());
        }

        let mut flat: Vec<f32> = Vec::with_capacity(model.size());
        for param in model.parameters() {
            flat.extend(param.value().iter());
        }

        self.collective.broadcast(&mut flat, 0)?;

        let mut offset = 0;
        for param in model.parameters_mut() {
            let value = param.value_mut();
            let len = value.len();
            value
                .iter_mut()
                .zip(&flat[offset..offset + len])
                .for_each(|(v, &r)| *v = r);
            offset += len;
        }

        Ok(())
    }

    /// Checks every replica will run the same amount of train steps per epoch.
    ///
    /// # Returns
    /// The agreed step count.
    ///
    /// # Errors
    /// `WorkerErr::UnevenShards` on every replica if any of them disagrees, so
    /// none is left waiting in a later collective.
    pub fn agree_on_steps(&self, local: usize) -> Result<usize> {
        let mut bounds = [local as f32, -(local as f32)];
        self.collective.all_reduce(&mut bounds, ReduceOp::Max)?;

        let max = bounds[0] as usize;
        let min = (-bounds[1]) as usize;

        if min != max {
            return Err(WorkerErr::UnevenShards {
                rank: self.rank(),
                local,
                min,
                max,
            });
        }

        Ok(local)
    }
}
