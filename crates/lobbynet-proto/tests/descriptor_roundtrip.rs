use lobbynet_proto::NetworkDescriptor;
use lobbynet_proto::limits::MAX_SERIALIZED_DESCRIPTOR_LEN;
use proptest::prelude::*;

fn descriptor() -> impl Strategy<Value = NetworkDescriptor> {
    (
        "[0-9a-f]{8,32}",
        "[A-Za-z]{0,16}",
        proptest::collection::vec(any::<u8>(), 0..200),
    )
        .prop_map(|(id, region, info)| NetworkDescriptor {
            network_identifier: id,
            region_name: region,
            opaque_connection_info: info,
        })
}

proptest! {
    #[test]
    fn descriptor_survives_text_form(d in descriptor()) {
        let text = d.serialize().unwrap();
        prop_assert!(text.len() <= MAX_SERIALIZED_DESCRIPTOR_LEN);
        prop_assert_eq!(NetworkDescriptor::deserialize(&text).unwrap(), d);
    }
}
