use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IUnirep {
        function currentEpoch() external view returns (uint256);

        /// Emitted after every protocol event with that event's type code.
        event Sequencer(uint256 indexed epoch, uint8 userEvent);

        event UserSignedUp(
            uint256 indexed epoch,
            uint256 indexed identityCommitment,
            uint256 hashedLeaf
        );

        event AttestationSubmitted(
            uint256 indexed epoch,
            uint256 indexed epochKey,
            uint256 attesterId,
            uint256 posRep,
            uint256 negRep,
            uint256 graffiti,
            bool overwriteGraffiti
        );

        event EpochEnded(uint256 indexed epoch, uint256[] epochKeys, uint256[] hashchainResults);

        event UserStateTransitioned(
            uint256 indexed fromEpoch,
            uint256 indexed toEpoch,
            uint256 newGstLeaf,
            uint256[] epkNullifiers,
            uint256[] attestationNullifiers
        );

        event ReputationNullifiersSpent(uint256 indexed epoch, uint256[] nullifiers);
    }
}
