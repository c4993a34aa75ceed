//! Joinsplit proof dispatch and the randomized construction of new joinsplits.
//!
//! The proving system itself lives outside this crate. [`JoinSplitVerifier`] and [`JoinSplitProver`] are the
//! seams; this module only picks the scheme and lays out the public inputs.

use crate::{
    transaction::joinsplit::{
        Commitment, GrothProof, JoinSplitDescription, Nullifier, PhgrProof, SproutProof,
        ZC_NUM_JS_INPUTS, ZC_NUM_JS_OUTPUTS,
    },
    uint::Uint256,
    Amount,
};

/// Personalization of the BLAKE2b hash binding a joinsplit to its signing key
pub const H_SIG_PERSONALIZATION: &[u8; 16] = b"ZcashComputehSig";

/// Public inputs of a scheme-B verification, in the order the verifier consumes them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrothPublicInputs {
    /// Commitment tree root
    pub anchor: Uint256,
    /// Signature binding hash, see [`h_sig`]
    pub h_sig: Uint256,
    /// Message authentication tags
    pub macs: [Uint256; ZC_NUM_JS_INPUTS],
    /// Revealed nullifiers
    pub nullifiers: [Nullifier; ZC_NUM_JS_INPUTS],
    /// New note commitments
    pub commitments: [Commitment; ZC_NUM_JS_OUTPUTS],
    /// Transparent value entering the pool
    pub vpub_old: u64,
    /// Transparent value leaving the pool
    pub vpub_new: u64,
}

/// The external proof verifier.
pub trait JoinSplitVerifier {
    /// Scheme-A verification against the verifier's own key material.
    fn verify_phgr(
        &self,
        proof: &PhgrProof,
        js: &JoinSplitDescription,
        join_split_pub_key: &Uint256,
    ) -> bool;

    /// Scheme-B verification over the proof bytes and fixed-width public inputs.
    fn verify_groth(&self, proof: &GrothProof, inputs: &GrothPublicInputs) -> bool;
}

/// Everything the prover returns for one joinsplit
#[derive(Debug, Clone)]
pub struct ProvenJoinSplit {
    /// Completed description, proof included
    pub description: JoinSplitDescription,
    /// Ephemeral secret used for note encryption, kept for payment disclosure
    pub esk: Option<Uint256>,
}

/// The external prover.
pub trait JoinSplitProver {
    /// A note being spent, with its witness and spending key
    type Input;
    /// A note being created, with its receiver and memo
    type Output;

    /// Builds a joinsplit spending `inputs` into `outputs`. With `compute_proof` false the proof is left empty.
    #[allow(clippy::too_many_arguments)]
    fn prove(
        &self,
        use_groth: bool,
        join_split_pub_key: &Uint256,
        anchor: &Uint256,
        inputs: &[Self::Input; ZC_NUM_JS_INPUTS],
        outputs: &[Self::Output; ZC_NUM_JS_OUTPUTS],
        vpub_old: Amount,
        vpub_new: Amount,
        compute_proof: bool,
    ) -> ProvenJoinSplit;
}

/// A randomized joinsplit and the permutations applied to its inputs and outputs.
///
/// `input_map[k]` is the position the `k`th shuffled input had in the caller's array; outputs likewise.
#[derive(Debug, Clone)]
pub struct RandomizedJoinSplit {
    /// The joinsplit built from the shuffled notes
    pub proven: ProvenJoinSplit,
    /// Original position of each shuffled input
    pub input_map: [usize; ZC_NUM_JS_INPUTS],
    /// Original position of each shuffled output
    pub output_map: [usize; ZC_NUM_JS_OUTPUTS],
}

/// BLAKE2b-256 over `random_seed || nullifiers || join_split_pub_key`
pub fn h_sig(
    random_seed: &Uint256,
    nullifiers: &[Nullifier; ZC_NUM_JS_INPUTS],
    join_split_pub_key: &Uint256,
) -> Uint256 {
    let mut state = blake2b_simd::Params::new()
        .hash_length(32)
        .personal(H_SIG_PERSONALIZATION)
        .to_state();
    state.update(random_seed.as_bytes());
    for nullifier in nullifiers {
        state.update(nullifier.as_bytes());
    }
    state.update(join_split_pub_key.as_bytes());
    let hash = state.finalize();
    Uint256::from_slice(hash.as_bytes()).expect("32 byte digest")
}

/// Verifies the proof of `js` with the scheme its proof variant names.
///
/// Negative `vpub` values cannot be marshalled for scheme B and fail verification.
pub fn verify_joinsplit<V>(js: &JoinSplitDescription, verifier: &V, join_split_pub_key: &Uint256) -> bool
where
    V: JoinSplitVerifier + ?Sized,
{
    match &js.proof {
        SproutProof::Phgr(proof) => verifier.verify_phgr(proof, js, join_split_pub_key),
        SproutProof::Groth(proof) => {
            let (Ok(vpub_old), Ok(vpub_new)) = (u64::try_from(js.vpub_old), u64::try_from(js.vpub_new))
            else {
                return false;
            };
            let inputs = GrothPublicInputs {
                anchor: js.anchor,
                h_sig: h_sig(&js.random_seed, &js.nullifiers, join_split_pub_key),
                macs: js.macs,
                nullifiers: js.nullifiers,
                commitments: js.commitments,
                vpub_old,
                vpub_new,
            };
            verifier.verify_groth(proof, &inputs)
        }
    }
}

/// Fisher-Yates shuffle of `items` from the back, applying every swap to `map` as well.
///
/// `gen(n)` must return a value in `0..n`. Starting from the identity map, `original[map[k]] == items[k]`
/// afterwards.
pub fn mapped_shuffle<T, G>(items: &mut [T], map: &mut [usize], mut gen: G)
where
    G: FnMut(usize) -> usize,
{
    assert_eq!(items.len(), map.len(), "shuffle map covers every item");
    for i in (1..items.len()).rev() {
        let r = gen(i + 1);
        assert!(r <= i, "shuffle generator returned {r} for bound {}", i + 1);
        items.swap(i, r);
        map.swap(i, r);
    }
}

impl JoinSplitDescription {
    /// Shuffles `inputs` and `outputs` independently, then proves the joinsplit over the shuffled order.
    #[allow(clippy::too_many_arguments)]
    pub fn randomized<P, G>(
        prover: &P,
        use_groth: bool,
        join_split_pub_key: &Uint256,
        anchor: &Uint256,
        mut inputs: [P::Input; ZC_NUM_JS_INPUTS],
        mut outputs: [P::Output; ZC_NUM_JS_OUTPUTS],
        vpub_old: Amount,
        vpub_new: Amount,
        compute_proof: bool,
        mut gen: G,
    ) -> RandomizedJoinSplit
    where
        P: JoinSplitProver + ?Sized,
        G: FnMut(usize) -> usize,
    {
        let mut input_map = [0, 1];
        let mut output_map = [0, 1];
        mapped_shuffle(&mut inputs, &mut input_map, &mut gen);
        mapped_shuffle(&mut outputs, &mut output_map, &mut gen);

        let proven = prover.prove(
            use_groth,
            join_split_pub_key,
            anchor,
            &inputs,
            &outputs,
            vpub_old,
            vpub_new,
            compute_proof,
        );
        RandomizedJoinSplit {
            proven,
            input_map,
            output_map,
        }
    }

    /// Binding hash of this joinsplit under `join_split_pub_key`
    pub fn h_sig(&self, join_split_pub_key: &Uint256) -> Uint256 {
        h_sig(&self.random_seed, &self.nullifiers, join_split_pub_key)
    }
}
