use crate::types::{ElectrumPeer, Network};

/// Hardcoded Electrum servers used when the caller supplies none.
pub fn default_electrum_peers(network: Network) -> Vec<ElectrumPeer> {
    match network {
        Network::Bitcoin => vec![
            ElectrumPeer::ssl("electrum.blockstream.info", 50002),
            ElectrumPeer::ssl("mempool.space", 50002),
            ElectrumPeer::ssl("electrum.emzy.de", 50002),
        ],
        Network::Testnet => vec![
            ElectrumPeer::ssl("electrum.blockstream.info", 60002),
            ElectrumPeer::ssl("testnet.aranguren.org", 51002),
        ],
        Network::Signet => vec![ElectrumPeer::ssl("mempool.space", 60602)],
        Network::Regtest => vec![ElectrumPeer::tcp("127.0.0.1", 60401)],
    }
}
