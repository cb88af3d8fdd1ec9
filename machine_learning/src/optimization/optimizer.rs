use crate::Result;

pub trait Optimizer {
    /// Takes one step over `params` following `grad`.
    ///
    /// # Arguments
    /// * `learning_rate` - The learning rate for this step, given by the schedule.
    /// * `params` - The parameters that are going to be modified.
    /// * `grad` - The gradient of the objective with respect to `params`.
    fn update_params(&mut self, learning_rate: f32, params: &mut [f32], grad: &[f32]) -> Result<()>;
}
