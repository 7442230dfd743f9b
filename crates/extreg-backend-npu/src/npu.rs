//! The mock npu backend proper: kernels over host `f32` buffers, a CPU
//! round-trip fallback, an autograd pair, autocast policies, an RNG, a guard
//! implementation, and a metadata codec.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use half::{bf16, f16};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use extreg::dispatch::{KernelCall, KernelFn};
use extreg::meta::{MetaMap, MetaValue};
use extreg::{
    autocast, autograd, dispatch, generator, guard, meta, naming, CastPolicy, Device,
    DeviceGuardImpl, DeviceIndex, DType, EventId, ExtTensor, Generator, RegistryError, Slot,
    StreamId,
};

/// The reserved slot this backend claims.
pub const NPU_SLOT: Slot = Slot::PrivateUse1;

/// Number of mock devices the backend exposes.
pub const NPU_DEVICE_COUNT: DeviceIndex = 2;

/// Host-memory payload standing in for device memory.
#[derive(Debug, Clone, PartialEq)]
pub struct NpuBuffer {
    pub data: Vec<f32>,
}

impl NpuBuffer {
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }
}

fn buffer_of(tensor: &ExtTensor) -> Result<&NpuBuffer, RegistryError> {
    tensor.payload_as::<NpuBuffer>()
}

fn tensor_like(template: &ExtTensor, data: Vec<f32>) -> ExtTensor {
    ExtTensor::new(
        template.device(),
        template.dtype(),
        template.shape().iter().copied(),
        Arc::new(NpuBuffer::new(data)),
    )
}

fn binary_inputs<'a>(
    call: &'a KernelCall<'_>,
) -> Result<(&'a ExtTensor, &'a ExtTensor), RegistryError> {
    match call.inputs {
        [a, b] => Ok((a, b)),
        other => Err(RegistryError::execution(format!(
            "'{}' expects 2 inputs, got {}",
            call.signature,
            other.len()
        ))),
    }
}

fn elementwise(a: &[f32], b: &[f32], op: impl Fn(f32, f32) -> f32) -> Result<Vec<f32>, RegistryError> {
    if a.len() != b.len() {
        return Err(RegistryError::execution(format!(
            "shape mismatch: {} vs {} elements",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b).map(|(x, y)| op(*x, *y)).collect())
}

/// `add.Tensor` kernel.
pub fn add_kernel() -> KernelFn {
    Arc::new(|call: &KernelCall<'_>| {
        let (a, b) = binary_inputs(call)?;
        let out = elementwise(&buffer_of(a)?.data, &buffer_of(b)?.data, |x, y| x + y)?;
        Ok(vec![tensor_like(a, out)])
    })
}

/// `mul.Tensor` kernel, also the forward half of the autograd override.
pub fn mul_kernel() -> KernelFn {
    Arc::new(|call: &KernelCall<'_>| {
        let (a, b) = binary_inputs(call)?;
        let out = elementwise(&buffer_of(a)?.data, &buffer_of(b)?.data, |x, y| x * y)?;
        Ok(vec![tensor_like(a, out)])
    })
}

/// Backward half of the `mul.Tensor` override: inputs are
/// `[grad_out, a, b]`, outputs `[grad_a, grad_b]`.
pub fn mul_backward_kernel() -> KernelFn {
    Arc::new(|call: &KernelCall<'_>| {
        let [grad, a, b] = call.inputs else {
            return Err(RegistryError::execution(format!(
                "'{}' backward expects [grad, a, b], got {} inputs",
                call.signature,
                call.inputs.len()
            )));
        };
        let grad_data = &buffer_of(grad)?.data;
        let grad_a = elementwise(grad_data, &buffer_of(b)?.data, |g, y| g * y)?;
        let grad_b = elementwise(grad_data, &buffer_of(a)?.data, |g, x| g * x)?;
        Ok(vec![tensor_like(a, grad_a), tensor_like(b, grad_b)])
    })
}

/// Catch-all handler: marshals payloads to host vectors, runs the host
/// reference implementation, and tags results back onto the npu device.
/// The round-trip is the price of not implementing the operator natively.
pub fn cpu_fallback() -> KernelFn {
    Arc::new(|call: &KernelCall<'_>| {
        let mut host: Vec<Vec<f32>> = Vec::with_capacity(call.inputs.len());
        for tensor in call.inputs {
            host.push(buffer_of(tensor)?.data.clone());
        }
        let out = match call.signature.name() {
            "sub" => {
                let [a, b] = host.as_slice() else {
                    return Err(RegistryError::execution(format!(
                        "'{}' expects 2 inputs, got {}",
                        call.signature,
                        host.len()
                    )));
                };
                elementwise(a, b, |x, y| x - y)?
            }
            "neg" => {
                let [a] = host.as_slice() else {
                    return Err(RegistryError::execution(format!(
                        "'{}' expects 1 input, got {}",
                        call.signature,
                        host.len()
                    )));
                };
                a.iter().map(|x| -*x).collect()
            }
            other => {
                return Err(RegistryError::execution(format!(
                    "host reference implementation cannot run '{other}'"
                )))
            }
        };
        let template = call.inputs.first().ok_or_else(|| {
            RegistryError::execution(format!("'{}' called with no inputs", call.signature))
        })?;
        Ok(vec![tensor_like(template, out)])
    })
}

/// Rounds an `f32` buffer through the reduced-precision type autocast chose.
/// Values keep their `f32` representation; only precision is dropped.
pub fn cast_buffer(tensor: &ExtTensor, target: DType) -> Result<ExtTensor, RegistryError> {
    let data = &buffer_of(tensor)?.data;
    let rounded: Vec<f32> = match target {
        DType::F16 => data.iter().map(|x| f16::from_f32(*x).to_f32()).collect(),
        DType::Bf16 => data.iter().map(|x| bf16::from_f32(*x).to_f32()).collect(),
        _ => data.clone(),
    };
    let mut out = ExtTensor::new(
        tensor.device(),
        target,
        tensor.shape().iter().copied(),
        Arc::new(NpuBuffer::new(rounded)),
    );
    if let Some(metadata) = tensor.metadata() {
        out.set_metadata(Arc::clone(metadata));
    }
    Ok(out)
}

#[derive(Serialize, Deserialize)]
struct GeneratorState {
    seed: u64,
    drawn: u64,
}

/// Counter-based RNG: state is (seed, number of draws), restore reseeds and
/// replays, so a restored generator continues the exact stream.
pub struct NpuGenerator {
    device_index: DeviceIndex,
    seed: u64,
    rng: StdRng,
    drawn: u64,
}

impl NpuGenerator {
    pub fn new(device_index: DeviceIndex, seed: u64) -> Self {
        Self {
            device_index,
            seed,
            rng: StdRng::seed_from_u64(seed),
            drawn: 0,
        }
    }
}

impl Generator for NpuGenerator {
    fn device_index(&self) -> DeviceIndex {
        self.device_index
    }

    fn current_seed(&self) -> u64 {
        self.seed
    }

    fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self.drawn = 0;
    }

    fn next_u64(&mut self) -> u64 {
        self.drawn += 1;
        self.rng.gen()
    }

    fn state(&self) -> Vec<u8> {
        let state = GeneratorState {
            seed: self.seed,
            drawn: self.drawn,
        };
        // Serialization of two integers cannot fail.
        serde_json::to_vec(&state).unwrap_or_default()
    }

    fn set_state(&mut self, state: &[u8]) -> Result<(), RegistryError> {
        let state: GeneratorState = serde_json::from_slice(state)
            .map_err(|err| RegistryError::invalid_state(err.to_string()))?;
        self.set_seed(state.seed);
        for _ in 0..state.drawn {
            self.next_u64();
        }
        self.drawn = state.drawn;
        Ok(())
    }
}

struct EventRecord {
    recorded_on: Option<StreamId>,
}

struct GuardState {
    current: DeviceIndex,
    streams: HashMap<DeviceIndex, StreamId>,
    events: HashMap<EventId, EventRecord>,
}

/// Guard implementation over mutex-protected mock state. All queued work is
/// synchronous here, so events complete the moment they are recorded.
pub struct NpuGuard {
    state: Mutex<GuardState>,
    next_event: AtomicU64,
}

impl NpuGuard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GuardState {
                current: 0,
                streams: HashMap::new(),
                events: HashMap::new(),
            }),
            next_event: AtomicU64::new(1),
        }
    }
}

impl Default for NpuGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceGuardImpl for NpuGuard {
    fn device_count(&self) -> DeviceIndex {
        NPU_DEVICE_COUNT
    }

    fn current_device(&self) -> DeviceIndex {
        self.state.lock().expect("guard mutex poisoned").current
    }

    fn exchange_device(&self, device: DeviceIndex) -> DeviceIndex {
        let mut state = self.state.lock().expect("guard mutex poisoned");
        std::mem::replace(&mut state.current, device)
    }

    fn current_stream(&self, device: DeviceIndex) -> StreamId {
        let state = self.state.lock().expect("guard mutex poisoned");
        state.streams.get(&device).copied().unwrap_or(StreamId(0))
    }

    fn exchange_stream(&self, device: DeviceIndex, stream: StreamId) -> StreamId {
        let mut state = self.state.lock().expect("guard mutex poisoned");
        state
            .streams
            .insert(device, stream)
            .unwrap_or(StreamId(0))
    }

    fn create_event(&self) -> EventId {
        let id = self.next_event.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().expect("guard mutex poisoned");
        state.events.insert(EventId(id), EventRecord { recorded_on: None });
        EventId(id)
    }

    fn record_event(&self, event: EventId, stream: StreamId) {
        let mut state = self.state.lock().expect("guard mutex poisoned");
        if let Some(record) = state.events.get_mut(&event) {
            record.recorded_on = Some(stream);
        }
    }

    fn query_event(&self, event: EventId) -> bool {
        let state = self.state.lock().expect("guard mutex poisoned");
        state
            .events
            .get(&event)
            .map(|record| record.recorded_on.is_some())
            .unwrap_or(false)
    }

    fn synchronize_event(&self, _event: EventId) {
        // Mock work is synchronous; recorded events are already complete.
    }

    fn destroy_event(&self, event: EventId) {
        let mut state = self.state.lock().expect("guard mutex poisoned");
        state.events.remove(&event);
    }
}

/// Opaque per-tensor metadata this backend attaches.
#[derive(Debug, Clone, PartialEq)]
pub struct NpuMeta {
    pub pinned: bool,
}

fn serialize_meta(tensor: &ExtTensor) -> Result<MetaMap, RegistryError> {
    let meta = tensor
        .metadata_as::<NpuMeta>()?
        .ok_or_else(|| RegistryError::execution("codec invoked on tensor without metadata"))?;
    let mut map = MetaMap::new();
    map.insert("pinned".to_string(), MetaValue::Bool(meta.pinned));
    Ok(map)
}

fn deserialize_meta(map: &MetaMap) -> Result<extreg::PayloadHandle, RegistryError> {
    let pinned = match map.get("pinned") {
        Some(MetaValue::Bool(value)) => *value,
        Some(other) => {
            return Err(RegistryError::execution(format!(
                "'pinned' must be a bool, got {other:?}"
            )))
        }
        None => false,
    };
    Ok(Arc::new(NpuMeta { pinned }))
}

/// The full registration sweep for [`NPU_SLOT`].
pub(crate) fn register_all() -> Result<(), RegistryError> {
    dispatch::register_kernel(NPU_SLOT, "add.Tensor", add_kernel())?;
    dispatch::register_kernel(NPU_SLOT, "mul.Tensor", mul_kernel())?;
    dispatch::register_fallback(NPU_SLOT, cpu_fallback())?;

    autograd::register_autograd(NPU_SLOT, "mul.Tensor", mul_kernel(), mul_backward_kernel())?;

    autocast::register_policy(NPU_SLOT, "add.Tensor", CastPolicy::CastToAutocast)?;
    autocast::register_policy(NPU_SLOT, "mul.Tensor", CastPolicy::PromoteToWidest)?;
    autocast::register_fallthrough(NPU_SLOT)?;

    generator::register_factory(
        NPU_SLOT,
        Arc::new(|device_index| -> extreg::GeneratorHandle {
            Box::new(NpuGenerator::new(device_index, 0))
        }),
    )?;

    guard::register_guard(NPU_SLOT, Arc::new(NpuGuard::new()))?;

    meta::register_codec(NPU_SLOT, Arc::new(serialize_meta), Arc::new(deserialize_meta))?;

    naming::bind_name(NPU_SLOT, "npu")?;
    Ok(())
}

/// Convenience constructor for tensors living on this backend.
pub fn npu_tensor(index: DeviceIndex, data: Vec<f32>) -> ExtTensor {
    let len = data.len();
    ExtTensor::new(
        Device::new(NPU_SLOT, index),
        DType::F32,
        [len],
        Arc::new(NpuBuffer::new(data)),
    )
}
