use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Dropout, DropoutConfig,
        Initializer,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::{
        activation::{gelu, softmax},
        Distribution,
    },
};

/// std of the normal init used for embeddings and linear weights
const INIT_STD: f64 = 0.02;

/// LayerNorm epsilon used throughout the transformer
const NORM_EPS: f64 = 1e-6;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct VisionTransformerConfig {
    pub num_classes: usize,
    pub image_size:  usize,
    pub patch_size:  usize,
    pub in_channels: usize,
    pub embed_dim:   usize,
    pub num_layers:  usize,
    pub num_heads:   usize,
    #[config(default = 2.0)]
    pub mlp_ratio:      f64,
    #[config(default = true)]
    pub qkv_bias:       bool,
    #[config(default = 0.0)]
    pub drop_rate:      f64,
    #[config(default = 0.1)]
    pub drop_path_rate: f64,
}

impl VisionTransformerConfig {
    pub fn num_patches(&self) -> usize {
        let per_side = self.image_size / self.patch_size;
        per_side * per_side
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> VisionTransformer<B> {
        let patch_embed = Conv2dConfig::new(
            [self.in_channels, self.embed_dim],
            [self.patch_size, self.patch_size],
        )
        .with_stride([self.patch_size, self.patch_size])
        .init(device);

        let cls_token = Param::from_tensor(Tensor::random(
            [1, 1, self.embed_dim],
            Distribution::Normal(0.0, INIT_STD),
            device,
        ));
        let pos_embed = Param::from_tensor(Tensor::random(
            [1, self.num_patches() + 1, self.embed_dim],
            Distribution::Normal(0.0, INIT_STD),
            device,
        ));

        // stochastic depth grows linearly from 0 at the first block
        let blocks: Vec<Block<B>> = (0..self.num_layers)
            .map(|i| self.build_block(self.drop_path_at(i), device))
            .collect();

        let norm = LayerNormConfig::new(self.embed_dim).with_epsilon(NORM_EPS).init(device);
        let head = self.linear(self.embed_dim, self.num_classes, true, device);
        let pos_drop = DropoutConfig::new(self.drop_rate).init();

        VisionTransformer {
            patch_embed, cls_token, pos_embed, pos_drop,
            blocks, norm, head,
        }
    }

    /// Drop-path rate of block `index`.
    pub fn drop_path_at(&self, index: usize) -> f64 {
        if self.num_layers <= 1 {
            return 0.0;
        }
        self.drop_path_rate * index as f64 / (self.num_layers - 1) as f64
    }

    fn build_block<B: Backend>(&self, drop_path: f64, device: &B::Device) -> Block<B> {
        let dim    = self.embed_dim;
        let hidden = (dim as f64 * self.mlp_ratio) as usize;

        let attn = Attention {
            qkv:       self.linear(dim, dim * 3, self.qkv_bias, device),
            proj:      self.linear(dim, dim, true, device),
            attn_drop: DropoutConfig::new(self.drop_rate).init(),
            proj_drop: DropoutConfig::new(self.drop_rate).init(),
            num_heads: self.num_heads,
        };
        let mlp = Mlp {
            fc1:     self.linear(dim, hidden, true, device),
            fc2:     self.linear(hidden, dim, true, device),
            dropout: DropoutConfig::new(self.drop_rate).init(),
        };
        let norm1 = LayerNormConfig::new(dim).with_epsilon(NORM_EPS).init(device);
        let norm2 = LayerNormConfig::new(dim).with_epsilon(NORM_EPS).init(device);

        Block { norm1, attn, norm2, mlp, drop_path }
    }

    fn linear<B: Backend>(&self, d_in: usize, d_out: usize, bias: bool, device: &B::Device) -> Linear<B> {
        LinearConfig::new(d_in, d_out)
            .with_bias(bias)
            .with_initializer(Initializer::Normal { mean: 0.0, std: INIT_STD })
            .init(device)
    }
}

#[derive(Module, Debug)]
pub struct Attention<B: Backend> {
    pub qkv:       Linear<B>,
    pub proj:      Linear<B>,
    pub attn_drop: Dropout,
    pub proj_drop: Dropout,
    pub num_heads: usize,
}

impl<B: Backend> Attention<B> {
    /// x: [batch, tokens, dim] → [batch, tokens, dim]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, tokens, dim] = x.dims();
        let head_dim = dim / self.num_heads;
        let scale    = (head_dim as f64).powf(-0.5);

        // [batch, tokens, 3 * dim], laid out as q | k | v
        let qkv = self.qkv.forward(x);
        let split = |i: usize| {
            qkv.clone()
                .slice([0..batch, 0..tokens, i * dim..(i + 1) * dim])
                .reshape([batch, tokens, self.num_heads, head_dim])
                .swap_dims(1, 2) // [batch, heads, tokens, head_dim]
        };
        let (q, k, v) = (split(0), split(1), split(2));

        let attn = q.matmul(k.swap_dims(2, 3)).mul_scalar(scale);
        let attn = self.attn_drop.forward(softmax(attn, 3));

        let out = attn
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch, tokens, dim]);
        self.proj_drop.forward(self.proj.forward(out))
    }
}

#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    pub fc1:     Linear<B>,
    pub fc2:     Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> Mlp<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.dropout.forward(gelu(self.fc1.forward(x)));
        self.dropout.forward(self.fc2.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct Block<B: Backend> {
    pub norm1:     LayerNorm<B>,
    pub attn:      Attention<B>,
    pub norm2:     LayerNorm<B>,
    pub mlp:       Mlp<B>,
    pub drop_path: f64,
}

impl<B: Backend> Block<B> {
    /// Pre-norm residual block.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = x.clone() + drop_path(self.attn.forward(self.norm1.forward(x)), self.drop_path);
        x.clone() + drop_path(self.mlp.forward(self.norm2.forward(x)), self.drop_path)
    }
}

/// Stochastic depth: zero the whole residual branch of a sample with
/// probability `rate`, rescaling survivors by 1 / (1 - rate). Identity
/// outside of training (no autodiff) or when `rate` is 0.
pub fn drop_path<B: Backend>(x: Tensor<B, 3>, rate: f64) -> Tensor<B, 3> {
    if rate <= 0.0 || !B::ad_enabled() {
        return x;
    }
    let keep = 1.0 - rate;
    let [batch, _, _] = x.dims();
    let mask = Tensor::<B, 3>::random([batch, 1, 1], Distribution::Bernoulli(keep), &x.device());
    x * mask.div_scalar(keep)
}

#[derive(Module, Debug)]
pub struct VisionTransformer<B: Backend> {
    pub patch_embed: Conv2d<B>,
    pub cls_token:   Param<Tensor<B, 3>>,
    pub pos_embed:   Param<Tensor<B, 3>>,
    pub pos_drop:    Dropout,
    pub blocks:      Vec<Block<B>>,
    pub norm:        LayerNorm<B>,
    pub head:        Linear<B>,
}

impl<B: Backend> VisionTransformer<B> {
    /// images: [batch, channels, height, width] → logits: [batch, classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, _, _, _] = images.dims();

        // [batch, dim, h/p, w/p] → [batch, patches, dim]
        let patches = self.patch_embed.forward(images).flatten::<3>(2, 3).swap_dims(1, 2);
        let [_, _, dim] = patches.dims();

        let cls = Tensor::<B, 3>::zeros([batch, 1, dim], &patches.device()) + self.cls_token.val();
        let x   = Tensor::cat(vec![cls, patches], 1) + self.pos_embed.val();
        let mut x = self.pos_drop.forward(x);

        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.norm.forward(x); // [batch, 1 + patches, dim]

        let cls_out = x
            .slice([0..batch, 0..1, 0..dim])
            .reshape([batch, dim]);
        self.head.forward(cls_out)
    }
}
