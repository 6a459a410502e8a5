//! Seed constants for the three-way cuckoo probe.
//!
//! Row `3 * seed` holds the three 64-bit hash seeds selected by the seed byte
//! stored in an object header. These constants are part of the wire format
//! and must be kept verbatim.

pub(crate) const SEED_TABLE: [u64; 768] = [
    0x5a27472f1245a7ff, 0xeddaba64abf7395c, 0xcf8be3d0165b6f7a,
    0x79a2b28300dbe918, 0x277a445ce1007835, 0x3108190bb5e267de,
    0x61d7646736301350, 0xf421c6a52cc91b5d, 0x513bd42e53f01d5f,
    0xdeb7eae6408f6e87, 0x1d4604aed518d37b, 0x7d622a7930857b90,
    0x617486cf7811a9fa, 0x23d5c4544470595d, 0xb1196ad9361214dc,
    0x136f45b1f41ebd00, 0x6851b305831a45fc, 0x361db6a9779cb8dd,
    0x445e61691dbd5f60, 0x58d26ccd4d5aa6d2, 0x2c4abfaf6c6f40f1,
    0x99e8efb38ba3d04a, 0x9be88ea64fe8e750, 0x787b18142547cd55,
    0x85b0fc78c2e0bbac, 0x999caedfbaceafd8, 0xfe4385126a295417,
    0xeca3ecf77d9b7177, 0xd9f075d1bdae54bc, 0xab1f8f295481a4d6,
    0xef698d125466958e, 0xde8f107ac167eb79, 0x38dd60a797b80385,
    0x4c18b0d685f7bcf3, 0x3e860d6520f67392, 0xb8b533204efac130,
    0x841c44d8f7ce1701, 0xf71743a79c27282c, 0x1eef1b9edcf4f3a9,
    0xe4f0e6f627cccd2d, 0x6f4e8e19a6165a18, 0x60b33a63f392a46d,
    0x4121407ba59517d2, 0x64d9a2eac5c32071, 0x82a6efcc45d140b6,
    0x32fec00d34900c1b, 0x27d7ebfac6683882, 0xcb51b9206334138a,
    0xcdd6a4bf530b5757, 0x69dd7ec6236b7631, 0xac4224d692e117be,
    0x205b8d1f22751b10, 0xb068b38419052d8b, 0x169150a6c274e83e,
    0xbafd63cb54934243, 0x7c6891341b63c54e, 0x2a18f6916d102d98,
    0xf0c70eaa7536a39c, 0xbc74e924a78d7f0e, 0x6934198e95a3e549,
    0xfba84e6892d142a2, 0x384998f977ce7bf2, 0xe7e84ec15d2b5cb5,
    0xb4ba0909973c4ffd, 0x434b6868d7a1681b, 0x03a79309f3b163ef,
    0x4b080fea59fb7c76, 0xf86778965ec1a145, 0x7ccf7627d1e4f2b2,
    0x0a3d9a8a41298dae, 0x0e2b9b4a04997ce8, 0xdc434f5a6dc6861e,
    0xb270d3f9474a5b2d, 0x20f38b3d1904e5ae, 0x3ef3b1e9442a57e9,
    0x266a435d0c922dca, 0x753795d113b256e3, 0xbff434e2cf784ee9,
    0xb6d5164c96e7dc16, 0x430550d0d36c6300, 0xf36ab6fe7064efb5,
    0x07ec0ee830a1767c, 0x8a7a2cb95e34aaf2, 0x4eb0bcb33b0026b1,
    0x5e93428876dc5447, 0xd26438b1b2c4100f, 0xe3efed064b3aed46,
    0x18ba837598564c9b, 0x298024ccddd732b0, 0x11f5c594b49a6ca1,
    0x32ad47c782bb1d50, 0x5fff0c820f39b8f2, 0x755e477122565959,
    0xc8ae37f097d89cb8, 0xb24d1824b4f7ad71, 0x70053e9e0e59bc99,
    0x978c2bddc6bb741b, 0x602fad016df0a808, 0x804dca176b26292a,
    0x58251c008c7edf13, 0x0d17fceba691fd99, 0x8649a5e5cefb105b,
    0xc250595118d043dd, 0x312e9ddf798898c4, 0x5c2e38b5da45a719,
    0x2f0caaa2eeba1987, 0xa659235bc88e7101, 0x2b87f4449854d19d,
    0xd6d731fea26ded84, 0x3434c9a782f5d594, 0x154d6d9b515c1f5f,
    0x6db75059ca2630ef, 0x006ada5b46225ee9, 0x2a54fd59effa748b,
    0x91d2b78084536596, 0xf5f0f75e29cfc444, 0x3a862dfef2d0f286,
    0xec7b96e618bae21e, 0xbd0d63a1c1a98640, 0xfa77f2cb3db0de55,
    0x38293f6e834bc43d, 0x3a8b18b53a18363c, 0x8ad6cec289eeb313,
    0xd66192a47340fde8, 0xe8dc652ca9e0fd59, 0x944e86c2efe1646c,
    0x6f36dddadf6968d2, 0x131d797efd3fc44b, 0x2d47a6e4651d0b4b,
    0x7c5f630746dcc751, 0x77c19f43f7215063, 0x915d10c49752c481,
    0xa66ce8ec129aa339, 0x8479c8d59f5e44f5, 0x2674be9d1ccadb7a,
    0xec882c352d8f2019, 0xa28d1d33176e3ffc, 0x18175217054f43d0,
    0x1b3563f8c9d3aced, 0x7682fab75ba851fa, 0xc0d7b587f1574b49,
    0xcb8038cf0014f1d2, 0xac55ec88be788814, 0x0cb97a80028fe419,
    0x93a1e201e43c6674, 0xc9d71afddf74c30e, 0x0cd6c1f02c4e2e92,
    0x9523a254031101eb, 0x9c9f38f7bc597fc3, 0x4897bc8323323b7d,
    0xc9ea57f06f8202ce, 0x69cc4c0b02fa87ba, 0x606bdaa4b3ec9e08,
    0xed818257521cf215, 0xa8bbb5aa1deeb855, 0xa55a2102317c9ba9,
    0xd8e71eaf9f7d9fef, 0xaa6ef7175d0834c8, 0xe9bb38b5649541e6,
    0xf3a5c4bd1fefdf73, 0x07d348d3c1b339f3, 0x8186a7368c806656,
    0x916ae69e876e6c9f, 0xe18fbe8b5c1f707e, 0x364374da37c8014d,
    0xb82c3ee48e5172e9, 0x852e32079aa36c71, 0x5c40aa309192c94a,
    0x9157a8c505a1533f, 0x2570c06d4e2c7612, 0x3ebdfaac4943a92a,
    0xb1bf61f0ad96867e, 0xfe15d42582b16b16, 0x7e90acc417b18f8e,
    0x5622f26c274e9786, 0xebd547297577b88d, 0xd5ddc97d946f1be0,
    0xb2ef7645383abb58, 0xea1fdac5e10a40e6, 0x5a0195e5bda4819d,
    0x2739a68b77c133a3, 0x7d2012d920dcf157, 0x8f18323850a86f89,
    0x94d6536dd8250f76, 0xaba3659c04fdbf69, 0x3b5fa402e23d6993,
    0xb332d492b8a3b744, 0x48fb322f51460fdc, 0x7782f6bfd626fe57,
    0x57bffbc650ead523, 0xb91b97552b743f92, 0xd1ed60463dba78a4,
    0x57be08fa077b5844, 0xc6408e53e49bf582, 0xfc99cd4727d1df42,
    0xed38fa5e878c55b3, 0x5432ea023a69f99e, 0xc4468438dfc5a4dc,
    0x8e2d5e9fb6b758bf, 0xeb3073d58bce0c1e, 0x6b344610343ba385,
    0x61872e368bd81e31, 0x20e3c2507a8c3937, 0x5eba081e398b3522,
    0x3809ce85e9cc335e, 0x28c4c1d5f7c969c1, 0xcac0c3640edc467c,
    0xcb5795570c17d10f, 0xd475ab2d98cc766f, 0xd7dd8a5590b06c1c,
    0x862e4760c5658ab0, 0xee1c6e257623301f, 0xc53273caee86a8ca,
    0xc13c3e545722f1c4, 0x1ff3d041a0edce58, 0xf575213cae7e174c,
    0xce4c2a02ce1653c3, 0xc469e895e6146acf, 0xebf0fb1681cd9df2,
    0x9c5fec6439be1172, 0xd875737276fa0abd, 0xdeb4a99dcfb05822,
    0x333c355cc8283847, 0x35e7dd40e613e562, 0x3aa1da4f7875cf19,
    0x17f63a1172c70444, 0xeda465021b019797, 0x14b97c19251fc771,
    0x39a090f35940abbe, 0xce3bc2fe92efe9b7, 0xd992ce418042096f,
    0x67c54ee86e34282f, 0x7a4e847828da25fa, 0x1f655ea252209742,
    0x91a5658f089785ad, 0x984c38d5fe57a342, 0x794e4ce36aefacb7,
    0x6e7dd01f458d58cb, 0x8e895e43f557ac9f, 0x1f8384ed848bb4bd,
    0x887f8be841cd1cf2, 0x856e4d742088fe21, 0x5207f2ec7e447848,
    0x4b9e035a0c8d8857, 0x8577d02d8ecd7369, 0xe4d7e132feda262e,
    0x71b57dec609904ea, 0x0ea370024c688347, 0x057ce443de4bc1f5,
    0x497664b61852b3e4, 0xc945acce54c1522a, 0x41efe14d607a2735,
    0x99eb1b2e7d2b4a63, 0x42bbc6a9e3144dc8, 0x89c50aa4dd8b191a,
    0xda3596dbb12ab19b, 0xcd63c08eecf62a54, 0xa127127f2a6f0b68,
    0x0c5806c83642e502, 0xd91125073f399b83, 0x6dab93e5556db41c,
    0x01be658e1468934e, 0x2ec10fb37eb91d61, 0x8d37bca1386e0596,
    0x6f2c32ce30188cb7, 0x8be0324e1598c434, 0xc1444fe2962d6d03,
    0xfc704bf248d36fc3, 0x2389b5caf9b0bcf1, 0x490cc951e85f40c5,
    0x7015b39bcace294f, 0xd52680b1be873dc9, 0xbe5ef2c48387d585,
    0x19f7bc62ec77b8f0, 0x5442a9d23fea40b2, 0xe9461b9f76d4e108,
    0x7e9d8ebf5d1eb82b, 0x9ef231f5c2fd2bec, 0x5c5af47c5f82ddb5,
    0xec5f087bcde51440, 0x043d4a27b8412a75, 0x580917928a2466bd,
    0xf33c0ed06e0139c1, 0xdb9ff7b227bfcf2d, 0x31a0f5a71dc4aa95,
    0x4914bcf22c0423d0, 0xfa0b69358570660c, 0x4ab1fc945643957e,
    0x1141ce9421579e8d, 0xd2246801dca72a0b, 0xa507eeee73017fab,
    0x94a1ace2998caa8b, 0xf93c67d8b7ca9aa1, 0x87d0c3809945d595,
    0xfd1f69b11042adf6, 0xfd8a5ae4c7f60149, 0x67911cb6f3a34b73,
    0xedff8d114a9203ae, 0x682255c5b74b269c, 0x28522f58145979ce,
    0xd032f4032cccc828, 0xad72b2b499a2bf72, 0x277ac1311604d728,
    0x5301d1409e452ef3, 0x6f32572a776cc9d2, 0x9d3e5a1fda84e1d8,
    0x197dd52929b11c10, 0x3ffd34533bee649d, 0x8ad833b329d7dff2,
    0x79da2dd924830781, 0xcc3a599d4da08754, 0x5eb52caf67542ea1,
    0xf6277e794b846f0f, 0x904237ec32c91246, 0xea4f1d5b3b1773e0,
    0x8a29f992af20eb71, 0xd9cf68298fcc0e61, 0xcdd577b1eaebe80c,
    0xe02982d620c99a1d, 0x86b11ab12022a12f, 0xc8eff85ee5c7ef08,
    0x786fd4c3ebd9638e, 0xa288d5a1f7ccf351, 0xe28acd934460c5d5,
    0x430e4e4010db365c, 0x3ed1c5c46081ed62, 0xb897e70dceda5deb,
    0x862085cc97732225, 0x4c60478f131a75eb, 0x58646bca91d4efe8,
    0xb7789478e82bc09b, 0x51512191afa1b60b, 0x7297e1dfc4b4d413,
    0xd99ea6c8a0159374, 0x64792685e5c8a923, 0xa0e3e7bb537df62c,
    0xa674472eefb97e34, 0x368edf4e6076772f, 0x1a3c9fea0f2c3fa9,
    0x331917e5909b2449, 0x4d58a50e2078b171, 0xd56cf470daa27fb1,
    0x1422e07ab6b64bd9, 0xa996ae07205f6ba3, 0x041856b8ebf9732f,
    0xc88a3f95f0229975, 0x16324350d4682b38, 0xb5fab3f3a6ae5bb6,
    0x2e0a2dfbd9790e8f, 0xb84122813cfb80a7, 0x7000ce215d63d283,
    0x9597ca4f19ee6d16, 0xffb7a7fc02adaa00, 0xc7ec49a63779dc3b,
    0x2f799a3a2041d37e, 0x0e77b8863b07e357, 0x5be99ef924cc0624,
    0x1d1864e355290865, 0x948ceec6c3a3260d, 0x925cf040ea95d691,
    0x0350bb5d022f0167, 0x05729d3ef356bab1, 0x439d1a5689f0c458,
    0x20b9aa23ccffd493, 0xe76eb4621f8bb2cf, 0x238e99a1d8ed6224,
    0x798befaef2cebdc4, 0xe918d95d5a38da87, 0x26d1c5d6e08ba92d,
    0x765f3ca0a3e2d96e, 0xdeb3084db17cda2d, 0x543b027d2904bb91,
    0x4de434d7ef09f7e5, 0x02684bdcba8a03d4, 0x1128f8d98ea6a5ac,
    0xf23d7ee683edc6f9, 0x507751c96d55f33d, 0xc94b040f4f41d111,
    0xc36c739dc9f57408, 0x1c89448eff462f11, 0xb763592b1df2360d,
    0xb1b97339bd51eb98, 0x936fd25f45c76a90, 0x826ae0e4ffbbf408,
    0x41a51c2ec9c702d8, 0x75dcf228ff301d28, 0xf0ead5fdd2cd3dd1,
    0xeeb1e73489231354, 0x450d1aefbdcd10cc, 0xaa0f93e937db794a,
    0xfc1e82155262885c, 0x617d9b30097890cd, 0xb5dd7db8677499a3,
    0x66ab34927a5207d4, 0x9e7480158361eea7, 0xc8871c8264316ee7,
    0x228ec9f0938959c8, 0xe70f8be8a6b2d886, 0x61fbdc65dd0c60fb,
    0x70fcb9162dbe77bd, 0x837620f299f5a4ac, 0xb24826d7bf88c1c9,
    0xf0cacd80f141590d, 0xc897afc534861ad0, 0x4b897250f1646680,
    0xef1f8d9be9861c4f, 0x5bd8cf73531c20fa, 0x9721ff044a430818,
    0x8a2efe6045e7632b, 0x58bf9c8053cdef13, 0x6985fc9c9d5bc7cd,
    0x55be707aa1a731ee, 0x03a0fa11137860e7, 0xb5f7f733354b9bac,
    0xbe46778e622cc706, 0xc20f6557e65b3c01, 0xe992f662a93c94f8,
    0xa0841aab50073d0c, 0x6f86ef625899c632, 0x4154b558a40ee3bd,
    0x93f47d0fe2d936ae, 0x4f341bc52f35f164, 0x367d35d1b87c204d,
    0x368b66a0465d4eee, 0x67af26879390d210, 0xa4fef44883979974,
    0x59faf40ef3c85ebc, 0x8566fdea0b73be80, 0x998e7d4afc91045b,
    0x70ab5ae7c60f9109, 0xcb51988c8990bdef, 0x86bc70737c4f5916,
    0x9447fd9f2952f349, 0x49da95da0ce81735, 0xdd24231710ab869f,
    0x3e294837ab307e23, 0x473aeea20958d1a6, 0x5142fc93b20ffe2b,
    0x1a04e04cf643cffb, 0x901b7059ff2e0d27, 0x0d6f1d7ac988828a,
    0x5f583d312bccadfd, 0x9b5c46671d6b27cc, 0xeaa4836c9c447b88,
    0x773a697841a10910, 0x79d14ac4465c19d7, 0x3a9690e07c54afe7,
    0x69ee9028f7f6cd0f, 0x90968edf2dd96311, 0x82c739a73b027102,
    0x1549bf67db5f751d, 0x7dd6f71ae0cddccf, 0x7fdbacae8d958fb5,
    0x2ebd8712f03c07b4, 0x06d36e2cc08e5a33, 0x2a876251df697a53,
    0x99dfaee249ec02a1, 0x1c67725a026ac286, 0x95cd4535f788bec1,
    0xd8dfaba469bc54a1, 0xd36f140fc587240f, 0xd4ab9b76aeec842d,
    0xefd39c76fbba830e, 0x923624cd43bc9fc5, 0xf6325533e5655924,
    0xc208ca880327d5e7, 0xf751e52d243ee000, 0xe687c12b3ddd206b,
    0x7a171de8fd99c8a6, 0xc8dc5e38851e23f0, 0xb67b48f00de977c4,
    0x198caa8c8f88c59c, 0xbdc2483df34c6e07, 0x12546ac3b807baf8,
    0x5153c5b4f97126e5, 0xf3ecfbb3990e33f8, 0xe73105b9ab9c009f,
    0x9727a49bc9449db0, 0x391f77580ab133f2, 0x0eb01a4b6e5b789e,
    0xa5147fec1b43ce6e, 0x87cbdb601008323e, 0x179832561cf06683,
    0xf6df1fe607bc47b2, 0x682d6c88c5c5cfff, 0xa458ce2e1b38add3,
    0xdfc1fb1038093a92, 0x0d9ceaaaca389f06, 0x3f581f185597be3c,
    0xbf36458f6d7f5388, 0xdff3811b1cbfa3a5, 0xf4be7ad281dd0c3c,
    0xd479b96a8f8d99e6, 0x5be5479bab93dd5a, 0x0910d2f10e35e6ed,
    0xa5dc9cdba32d2d7a, 0xb74019f2fcad20bf, 0xcb56cbae8f51d9c3,
    0x7f5c4107d630c174, 0xe0e5f52b2c055da7, 0xf17acc5d0d9744b9,
    0x3f99f4e0bf7fcdd0, 0x07b8f56d6e66aa98, 0x3e2703622b5b3acf,
    0x4abd73907501112e, 0x0fa64fccdf835172, 0xc60af557f99c31c0,
    0x847b8690b7059da5, 0x439f377336ca6c2b, 0x985e520644386a6e,
    0x2f61a9166a6bba00, 0x0f5a0f97ee76baa3, 0x979b61c6bc83c5e6,
    0x9d28865f7ab96faa, 0x19a7750c2b104e0b, 0x330b2550592e80a2,
    0xb89d432933e6fe7a, 0x2e9f32cda0137f88, 0xab1e62ddd23e77b3,
    0x1f77b4d6f62173fa, 0x863e1aa2afa79cd3, 0xd6017169c4c1942b,
    0x74887a1a2c729917, 0xec265d4f23e02c2c, 0xdc3b5f748f3f3423,
    0xc7dfe87aa1e02a4f, 0x83271f06d4baa0c2, 0xfa183ad6005748d5,
    0xa3e04662bec0585d, 0x830008fc1e07652b, 0x8cb3dbba04dcc452,
    0x713363e3d79875e6, 0xe5966abb931f27b6, 0x80ae7eeb92188abc,
    0x5c13ec0dc1482247, 0xe952ef5f2cc9f24d, 0x71bc90a5f3825060,
    0xe7604f555e5e82af, 0xd4a9236ba8cffa56, 0xdd514705032174cb,
    0x8a64b12e846ef793, 0x5198cdeae41e1be8, 0x4f5310eb8b33cfae,
    0x01fa045ad33767be, 0x8881e77d982d2055, 0x8ba499404c6c5723,
    0x784640b95020b8b2, 0x8e6f5a8c5cd6764e, 0x8b312b0867b1afd8,
    0xd9dde65224d5532c, 0x58b510d2deb29c3c, 0xd05544eb8c9b73cb,
    0x475952834bfc777e, 0xc6e654aecf5fc5bd, 0x3ea747e63e723652,
    0xe9df2d3e971a2eac, 0x28ddc0cb1d495929, 0xe777de2235a831f4,
    0x50ddf18b70552027, 0xa2667c384a5f33de, 0x622e462aa17a724b,
    0x344095be42d0ec71, 0xe3599a0ebba82156, 0xc14840b95798481c,
    0x839e0bf89ccd5de5, 0x1f172ff5031a1872, 0xa415048fccf7d037,
    0x7cec12f82df05cb0, 0x9e63d1dce3fc803f, 0x8e42d5823887d01f,
    0xdbb9c557c85d4ce4, 0xcfab43b0e28f4809, 0x9085f6c81f9686be,
    0x7ee0a3abae2ffa32, 0x8c6c9cf13bcd0d91, 0x3c488cfd30e710f8,
    0x41a220d99bd26069, 0x671ca7dc90214783, 0xc7db19f80ac0f648,
    0x93e5bc785c928cdd, 0x0d56e6d1caf4d243, 0x603506884c1adf09,
    0x436a15a927e39c6b, 0x55893d31e306fe2e, 0xe232c843426f9bf1,
    0x8d3d12107ffb10bc, 0x922535aaa27c8b18, 0x5ae07caf50e9c305,
    0x456d83016c62566c, 0x0724924193117ada, 0x80e5bb7cc2ef825b,
    0x041e9dcfc0cf0641, 0xb12cbab8e2c31b6f, 0x5164888e4eb8c322,
    0x26c1d591ed1718ac, 0xe517a0508b1baa99, 0x152968c3b8e51239,
    0xacc0598f02fe29b9, 0x9cd7c2f313151e98, 0x3a436ac49347a424,
    0xf5f527d089263edb, 0x11f5e17f5db2b3f7, 0xfb00e6ba85f763b7,
    0xce993c7af9906aba, 0xebe6864a4ba2c507, 0x651837e53cbe37dd,
    0xd654b6ccdf25d5b6, 0xd314a7e16adb8c92, 0x3fbec4356c844b37,
    0x4c8dfd27a864f74e, 0x644360ccf75880f6, 0x8c15381536a041d6,
    0x556ee714a2bf3d81, 0x81d65409d71d01d9, 0x45d16bdc453cd52a,
    0xcb145f3ab68d33fb, 0x4b30ed5e1c8ce9f6, 0x0d6388a92f4abd30,
    0xbe78c16f7d142d3d, 0xb60b48868c376587, 0xbb2ef7561ab22b9b,
    0x1257a03e96d0e149, 0x3ee914b5adf92cbc, 0xe676a93ce9b79585,
    0xd4bd0a7c21e9344a, 0x2563151a557838c2, 0x688374a72563843f,
    0x90ca643d85b2ad6c, 0x96480743b4c5ec86, 0x483ee5cb6f7f34e4,
    0xa21effb5bf1b9276, 0xb05ec6bb3b6bea97, 0xf54874350deb330d,
    0x50c772c0e17e7b8f, 0x74fa555684319d03, 0xb29f81f7afe4df8b,
    0x0d179ce00887463b, 0x4ada3e8aff51a904, 0x0c409efade365f3c,
    0x3e4b2e10cd122801, 0x6b2243a103368ca3, 0xcfa31fbbdcd1ab40,
    0x9a6a5d1a7e0e5ba0, 0x8f8efdf697ec92da, 0x9f28398e828e001e,
    0xcc31af216577f0b3, 0xbd4ff49d5ada2d73, 0xcb233ef73ff53972,
    0x7a875767d2b9f9e2, 0xa1967d88722eba15, 0x96a01373d011aefc,
    0xd2db66519403b7c8, 0x7bce0ff02cf4fa3c, 0xf2c7467fc40ab866,
    0x0355fda03b2c5bbf, 0x04af0f72322b4662, 0xe585e4009469c2be,
    0xbcef119df6a5d0f7, 0xacb3411273397a2b, 0x382ad14453da2e6b,
    0xb0a0b08482cd5ab4, 0xe9a4942b9b694132, 0x30db634fd81de4d2,
    0x427741041cddd89b, 0x1849aa7b3684b143, 0xe93b7dbedd24ba37,
    0x2abb194b1501ebf0, 0xd0fa24fdbd0e9dff, 0x5807dcce871c004b,
    0x8b9fc3efe303752a, 0x5eb0ab8de36b908a, 0x76b8f19b7d83be69,
    0xa455e16c04da7d05, 0xb0f12e7ab6d1a31a, 0x1f785b7bc1f40170,
    0x5ef07235bcce6282, 0xabd58f78df9d7423, 0x16c128b093d65cf3,
    0x73deacedb38ba2e8, 0x0ecb6e9898876990, 0x6c9d6798e1f81b44,
    0xe5ce240a4b44fd88, 0x5fe280fba7b25814, 0xb11be175c6ecea70,
    0xbb9dd23ec2e25aa2, 0xfb4c6a1665b34063, 0xec12f95432839fd4,
    0xea0d08884c358a58, 0x1d73f94c42a355ef, 0x74ad10d4f3dffa76,
    0xfdd401216aad06da, 0xbc25f93de7b622d1, 0xc255ccb5887d556d,
    0x80060ed75dc747ae, 0xe93b702c41092e5c, 0x4fb89581787f87ed,
    0x5574b03993ae5836, 0xfe8f2cc99334784b, 0x0c9ae00e059a009a,
    0x6e3a112325c4dcad, 0x11026925a76da665, 0xe17eeb8afbeb6d01,
    0x2627bdbf09246a31, 0x33b87d5b6a4e3def, 0x84c6c0d6b7d48b9d,
    0xf2638b1a4cfa9445, 0xa643ffbb228a5954, 0x0a6cb7c5ed495945,
    0xed428a36770b993b, 0xac9cb3d4c8ef14ba, 0x7e50692853b41cdc,
    0x272d4ed1d692621b, 0x4c8381a8ff0f443e, 0xc2a9779c2d293de2,
    0x2c622d1de53aee3e, 0x000e31bf55d591d0, 0x2e3b2a1e8db96bca,
    0xf09157f9592433da, 0xbda6003dd1c19936, 0xa909670cda376744,
    0x198cf3207f06944c, 0xfcd67fb0f99cbf03, 0x5f631f44616502a3,
    0xcce9b2c803934d8e, 0xa00ef5999ddb325f, 0x687d7e71ac01fd32,
    0xcbe0ea6220ad87d3, 0xfc098055fbfa6291, 0x6b7de440c87ede5a,
    0xe48cf4e0ddfae66d, 0x395c5a5a5c03265d, 0xe2db49b5fbe0e6a0,
    0x21b6055ecfd21589, 0xc24333ffc476af48, 0x952099055475e0d6,
    0xd2951a8698be2105, 0xfe7ded32e21dc03e, 0x1d3f405e0567c8b5,
    0x03bfb29fb1f9f04a, 0xa545a1ba497949fc, 0x070bb7fd63739cea,
    0x6812587192bfa044, 0x0da87456d0f1c15a, 0xba0c969c4e8f14b4,
    0xfa821aa6ec641383, 0x07e4a3f4e3d8ce08, 0x92f66f26a9c0289c,
    0x78b680045238f8c6, 0xc30d47d4d5fa4b75, 0x4afc8d4b26e4fb36,
    0x6942c31ccc456b88, 0x34be37ddeb2fd33c, 0x22b6b33e8e25631b,
    0x0862ece62fbdc7bc, 0x0e242c065106daa8, 0xb878e8d3170f75e9,
    0x456ec7add8ef6cd5, 0xfd6b5da413587ffc, 0xc72ed7f012623ed0,
    0xffcdacf9b1573ae9, 0x0590ea296523d71a, 0x6a45638451ca45a8,
    0x8cd8fad4be1bc5e7, 0x4fa5c223ce9a528d, 0xa4c5aac14d7fe68d,
    0x73ce2a42f0a0ed5f, 0x74967ffc0460c902, 0x3c36e00e8d2d2ef5,
];
